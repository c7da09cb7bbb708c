use anyhow::Context;
use bigdecimal::BigDecimal;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{Address, Cart, HistoryOrder, LifecycleStage, Product, Role, TransactionEvent};
use crate::ledger::{ConfiguredAccount, InMemoryLedger, LedgerClient};
use crate::ports::{Ledger, Signer};
use crate::services::{
    ActivityStats, AdminService, CheckoutResult, CheckoutSequencer, CollectForm, LedgerReconciler,
    ProductFilter, RoleDirectory, RoleOverrideStore, StageActions,
};

#[derive(Parser)]
#[command(name = "agrichain-core")]
#[command(about = "AgriChain Core - supply-chain ledger client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// List products, optionally filtered
    Products {
        /// Stage name or ordinal; repeat for several
        #[arg(long)]
        stage: Vec<LifecycleStage>,

        /// Show the work queue of this role
        #[arg(long)]
        role: Option<Role>,

        /// Only products created by this farmer
        #[arg(long)]
        farmer: Option<Address>,

        /// Retailer-held and sold products
        #[arg(long, conflicts_with_all = ["stage", "role"])]
        marketplace: bool,
    },

    /// Show one product
    Product {
        #[arg(value_name = "PRODUCT_ID")]
        id: u64,
    },

    /// Show ledger history
    History {
        /// Restrict to one product
        #[arg(long)]
        product: Option<u64>,

        #[arg(long)]
        oldest_first: bool,
    },

    /// List accounts and their effective roles
    Users,

    /// Transactions per account and per day, users per role
    Stats,

    /// Local role overrides
    #[command(subcommand)]
    Role(RoleCommands),

    /// Create a product as the configured farmer account
    Create {
        name: String,
        /// Base price in display units, e.g. 1.0
        base_price: String,
    },

    /// Collect a product from the farmer
    Collect {
        id: u64,
        #[arg(long)]
        fee: String,
        #[arg(long)]
        district: String,
        #[arg(long)]
        local_body: String,
        #[arg(long)]
        distance_km: String,
    },

    /// Accept a collected product for transport
    Transport { id: u64 },

    /// Accept a product for distribution
    Distribute {
        id: u64,
        #[arg(long)]
        fee: String,
    },

    /// Send a product to the retailer
    Retail {
        id: u64,
        #[arg(long)]
        fee: String,
    },

    /// Buy retailer-held products in the given order
    Checkout {
        #[arg(required = true, value_name = "PRODUCT_ID")]
        ids: Vec<u64>,
    },

    /// Step a product back one stage (ledger admins only)
    Revert { id: u64 },

    /// Run the full Rice scenario against an in-memory ledger
    Demo,

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum RoleCommands {
    /// Override the role shown for an address
    Set { address: String, role: String },

    /// Drop the override for an address
    Clear { address: String },
}

/// Everything a command needs, wired against one ledger and one account.
pub struct Session {
    pub ledger: Arc<dyn Ledger>,
    pub signer: Arc<dyn Signer>,
    pub reconciler: LedgerReconciler,
    pub roles: RoleDirectory,
    pub gas_buffer_percent: u64,
}

impl Session {
    pub fn from_config(config: &Config) -> Self {
        let ledger: Arc<dyn Ledger> = Arc::new(LedgerClient::from_config(config));
        let signer = Arc::new(ConfiguredAccount::new(config.account_address.clone()));
        let store = Arc::new(RoleOverrideStore::new(config.role_overrides_path.clone()));
        Self::new(ledger, signer, store, config.gas_buffer_percent)
    }

    pub fn new(
        ledger: Arc<dyn Ledger>,
        signer: Arc<dyn Signer>,
        store: Arc<RoleOverrideStore>,
        gas_buffer_percent: u64,
    ) -> Self {
        Self {
            reconciler: LedgerReconciler::new(ledger.clone()),
            roles: RoleDirectory::new(ledger.clone(), store),
            ledger,
            signer,
            gas_buffer_percent,
        }
    }

    fn actions(&self) -> StageActions {
        StageActions::new(self.ledger.clone(), self.signer.clone())
    }

    async fn selected(&self, id: u64) -> anyhow::Result<Product> {
        self.reconciler
            .get_product(id)
            .await
            .with_context(|| format!("Could not load product {}", id))
    }
}

pub async fn handle_products(
    session: &Session,
    stages: Vec<LifecycleStage>,
    role: Option<Role>,
    farmer: Option<Address>,
    marketplace: bool,
) -> anyhow::Result<()> {
    let mut filter = match (marketplace, role) {
        (true, _) => ProductFilter::marketplace(),
        (false, Some(role)) => {
            let account = farmer.clone().or_else(|| session.signer.account());
            ProductFilter::for_role(role, account.as_ref())
                .context("Farmer view needs --farmer or ACCOUNT_ADDRESS")?
        }
        (false, None) => ProductFilter::any(),
    };
    if !stages.is_empty() {
        filter.stages = Some(stages);
    }
    if let Some(farmer) = farmer {
        filter = filter.owned_by(farmer);
    }

    let products = session.reconciler.list_products(&filter).await?;
    if products.is_empty() {
        println!("No products found");
        return Ok(());
    }

    println!(
        "{:<6} {:<24} {:<24} {:>12} {:>12}",
        "ID", "Name", "Stage", "Base", "Total"
    );
    println!("{}", "-".repeat(82));
    for product in products {
        println!(
            "{:<6} {:<24} {:<24} {:>12} {:>12}",
            product.id,
            product.name,
            product.stage.label(),
            product.base_price,
            product
                .total_price()
                .map(|total| total.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

pub async fn handle_product(session: &Session, id: u64) -> anyhow::Result<()> {
    let product = session.selected(id).await?;

    println!("Product {}: {}", product.id, product.name);
    println!("  Stage:           {}", product.stage.label());
    println!("  Base price:      {}", product.base_price);
    println!("  Collector fee:   {}", product.fees.collector_fee);
    println!("  Transporter fee: {}", product.fees.transporter_fee);
    println!("  Distributor fee: {}", product.fees.distributor_fee);
    println!("  Retailer fee:    {}", product.fees.retailer_fee);
    println!("  Total fee:       {}", product.total_fee());
    if let Some(total) = product.total_price() {
        println!("  Total price:     {}", total);
    }
    if let Some(location) = &product.location {
        println!(
            "  Location:        {}, {} ({} km)",
            location.local_body, location.district, location.distance_km
        );
    }
    if let Some(farmer) = &product.actors.farmer {
        println!("  Farmer:          {}", farmer);
    }
    Ok(())
}

pub async fn handle_history(
    session: &Session,
    product: Option<u64>,
    oldest_first: bool,
) -> anyhow::Result<()> {
    let order = if oldest_first || product.is_some() {
        HistoryOrder::OldestFirst
    } else {
        HistoryOrder::NewestFirst
    };
    let events = session.reconciler.fetch_history(product, order).await?;
    if events.is_empty() {
        println!("No transactions found");
        return Ok(());
    }
    for event in &events {
        println!("{}", describe_event(event));
    }
    Ok(())
}

fn describe_event(event: &TransactionEvent) -> String {
    let when = event
        .timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    let product = event
        .product_id
        .map(|id| format!("product {}", id))
        .unwrap_or_else(|| "-".to_string());
    let detail = match (&event.resulting_state, &event.amount) {
        (Some(stage), _) => format!("now {}", stage.label()),
        (None, Some(amount)) => format!("paid {}", amount),
        (None, None) => String::new(),
    };
    format!(
        "#{:<8} {:<20} {:<20} {:<14} {}",
        event.block_number,
        when,
        event.kind.ledger_name(),
        product,
        detail
    )
}

pub async fn handle_users(session: &Session) -> anyhow::Result<()> {
    let users = session.roles.list_users().await?;
    if users.is_empty() {
        println!("No users found");
        return Ok(());
    }
    for user in users {
        println!("{:<44} {:<12} {:?}", user.address, user.role, user.source);
    }
    Ok(())
}

pub async fn handle_stats(session: &Session) -> anyhow::Result<()> {
    let events = session
        .reconciler
        .fetch_history(None, HistoryOrder::NewestFirst)
        .await?;
    let users = session.roles.list_users().await?;
    let stats = ActivityStats::summarize(&events, &users);

    println!("Transactions by account ({} total)", stats.total_transactions());
    for (address, count) in &stats.transactions_by_sender {
        println!("  {:<44} {:>6}", address, count);
    }
    println!("Transactions by day");
    for (day, count) in &stats.transactions_by_day {
        println!("  {:<44} {:>6}", day, count);
    }
    println!("Users by role");
    for (role, count) in &stats.users_by_role {
        println!("  {:<44} {:>6}", role, count);
    }
    Ok(())
}

pub async fn handle_role_set(session: &Session, address: &str, role: &str) -> anyhow::Result<()> {
    let entry = session.roles.set_override(address, role).await?;
    println!("✓ {} is now shown as {}", entry.address, entry.role);
    Ok(())
}

pub async fn handle_role_clear(session: &Session, address: &str) -> anyhow::Result<()> {
    if session.roles.clear_override(address).await? {
        println!("✓ Override for {} cleared", address);
    } else {
        println!("No override for {}", address);
    }
    Ok(())
}

pub async fn handle_create(session: &Session, name: &str, base_price: &str) -> anyhow::Result<()> {
    let receipt = session.actions().create_product(name, base_price).await?;
    println!("✓ Product created in tx {}", receipt.transaction_hash);
    Ok(())
}

pub async fn handle_collect(session: &Session, id: u64, form: &CollectForm) -> anyhow::Result<()> {
    let product = session.selected(id).await?;
    let receipt = session.actions().collect_product(Some(&product), form).await?;
    println!("✓ Product {} collected in tx {}", id, receipt.transaction_hash);
    Ok(())
}

pub async fn handle_transport(session: &Session, id: u64) -> anyhow::Result<()> {
    let product = session.selected(id).await?;
    let receipt = session.actions().transport_product(Some(&product)).await?;
    println!("✓ Product {} in transport, tx {}", id, receipt.transaction_hash);
    Ok(())
}

pub async fn handle_distribute(session: &Session, id: u64, fee: &str) -> anyhow::Result<()> {
    let product = session.selected(id).await?;
    let receipt = session
        .actions()
        .distribute_product(Some(&product), fee)
        .await?;
    println!("✓ Product {} with distributor, tx {}", id, receipt.transaction_hash);
    Ok(())
}

pub async fn handle_retail(session: &Session, id: u64, fee: &str) -> anyhow::Result<()> {
    let product = session.selected(id).await?;
    let receipt = session.actions().send_to_retailer(Some(&product), fee).await?;
    println!("✓ Product {} sent to retailer, tx {}", id, receipt.transaction_hash);
    Ok(())
}

pub async fn handle_checkout(session: &Session, ids: &[u64]) -> anyhow::Result<CheckoutResult> {
    let mut cart = Cart::new();
    for &id in ids {
        let product = session.selected(id).await?;
        if !cart.add_line(&product) {
            println!(
                "Skipping product {}: {} is not for sale",
                id,
                product.stage.label()
            );
        }
    }
    println!("Cart total (display): {}", cart.total());

    let sequencer = CheckoutSequencer::new(session.ledger.clone(), session.signer.clone());
    let result = sequencer.checkout(&mut cart).await;
    if result.success {
        println!("✓ {}", result.message);
    } else {
        println!("✗ {}", result.message);
        if !cart.is_empty() {
            println!("Still in cart: {:?}", cart.product_ids());
        }
    }
    Ok(result)
}

pub async fn handle_revert(session: &Session, id: u64) -> anyhow::Result<()> {
    let admin = AdminService::new(
        session.ledger.clone(),
        session.signer.clone(),
        session.gas_buffer_percent,
    );
    let receipt = admin.revert(id).await?;
    println!("✓ Product {} reverted in tx {}", id, receipt.transaction_hash);
    Ok(())
}

/// What the demo run ended with.
#[derive(Debug)]
pub struct DemoReport {
    pub product: Product,
    pub checkout: CheckoutResult,
    pub retailer_fee_paid: BigDecimal,
}

/// Walks "Rice" from farmer to consumer on an in-memory ledger, one account
/// per role.
pub async fn run_demo() -> anyhow::Result<DemoReport> {
    let ledger = Arc::new(InMemoryLedger::new());
    let mut accounts = Vec::new();
    for (index, role) in Role::ALL.into_iter().enumerate() {
        let address = Address::parse(&format!("0x{:040x}", index + 1))?;
        ledger.register(&address, role).await;
        accounts.push((role, address));
    }
    let account = |role: Role| -> Arc<dyn Signer> {
        let address = accounts
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, a)| a.clone());
        Arc::new(ConfiguredAccount::new(address))
    };
    let actions = |role: Role| StageActions::new(ledger.clone(), account(role));
    let reconciler = LedgerReconciler::new(ledger.clone());

    actions(Role::Farmer).create_product("Rice", "1.0").await?;
    let id = 1;

    let product = reconciler.get_product(id).await?;
    let form = CollectForm {
        collector_fee: "0.2".to_string(),
        district: "Kailali".to_string(),
        local_body: "Dhangadhi".to_string(),
        distance_km: "10".to_string(),
    };
    actions(Role::Collector)
        .collect_product(Some(&product), &form)
        .await?;

    let product = reconciler.get_product(id).await?;
    actions(Role::Transporter)
        .transport_product(Some(&product))
        .await?;

    let product = reconciler.get_product(id).await?;
    actions(Role::Distributor)
        .distribute_product(Some(&product), "0.15")
        .await?;

    let product = reconciler.get_product(id).await?;
    actions(Role::Retailer)
        .send_to_retailer(Some(&product), "0.05")
        .await?;

    let for_sale = reconciler.get_product(id).await?;
    let mut cart = Cart::new();
    cart.add_line(&for_sale);

    let sequencer = CheckoutSequencer::new(ledger.clone(), account(Role::Consumer));
    let checkout = sequencer.checkout(&mut cart).await;

    let retailer_fee_paid = ledger
        .submitted()
        .await
        .into_iter()
        .rev()
        .find(|(call, _)| call.method_name() == "purchaseProduct")
        .map(|(_, options)| options.value.to_display())
        .unwrap_or_default();

    Ok(DemoReport {
        product: for_sale,
        checkout,
        retailer_fee_paid,
    })
}

pub async fn handle_demo() -> anyhow::Result<()> {
    let report = run_demo().await?;
    let product = &report.product;

    println!("Product {}: {}", product.id, product.name);
    println!("  Base price:  {}", product.base_price);
    println!("  Total fee:   {}", product.total_fee());
    if let Some(total) = product.total_price() {
        println!("  Total price: {}", total);
    }
    println!("  Paid at checkout: {}", report.retailer_fee_paid);
    println!("{}", report.checkout.message);
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Ledger URL: {}", config.ledger_url);
    println!(
        "  Account: {}",
        config
            .account_address
            .as_ref()
            .map(Address::to_string)
            .unwrap_or_else(|| "(not connected)".to_string())
    );
    println!("  Role overrides: {}", config.role_overrides_path.display());
    println!(
        "  Circuit breaker: {} failures, {}s reset",
        config.circuit_breaker_threshold, config.circuit_breaker_reset_secs
    );
    println!("  Gas buffer: {}%", config.gas_buffer_percent);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_cli_parses_product_filters() {
        let cli = Cli::parse_from([
            "agrichain-core",
            "products",
            "--stage",
            "with_retailer",
            "--stage",
            "5",
        ]);
        match cli.command {
            Some(Commands::Products { stage, .. }) => {
                assert_eq!(stage, vec![LifecycleStage::WithRetailer, LifecycleStage::Sold]);
            }
            _ => panic!("expected products command"),
        }
    }

    #[test]
    fn test_cli_parses_stats() {
        let cli = Cli::parse_from(["agrichain-core", "stats"]);
        assert!(matches!(cli.command, Some(Commands::Stats)));
    }

    #[test]
    fn test_cli_requires_checkout_ids() {
        assert!(Cli::try_parse_from(["agrichain-core", "checkout"]).is_err());
    }

    #[tokio::test]
    async fn test_demo_pays_only_the_retailer_fee() {
        let report = run_demo().await.unwrap();

        assert_eq!(report.product.total_price(), Some(BigDecimal::from_str("1.5").unwrap()));
        assert_eq!(report.retailer_fee_paid, BigDecimal::from_str("0.05").unwrap());
        assert!(report.checkout.success);
        assert_eq!(report.checkout.purchased_product_ids, vec![1]);
    }
}
