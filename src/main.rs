use agrichain_core::cli::{self, Cli, Commands, RoleCommands, Session};
use agrichain_core::config::Config;
use agrichain_core::ledger::LedgerClient;
use agrichain_core::ports::Ledger;
use agrichain_core::services::{CollectForm, RoleDirectory, RoleOverrideStore};
use agrichain_core::{create_app, AppState};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    // The demo runs entirely in memory and needs no configuration.
    if let Some(Commands::Demo) = cli.command {
        return cli::handle_demo().await;
    }

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Demo => cli::handle_demo().await,
        command => {
            let session = Session::from_config(&config);
            run_command(&session, command).await
        }
    }
}

fn init_tracing() {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let ledger: Arc<dyn Ledger> = Arc::new(LedgerClient::from_config(&config));
    tracing::info!("Ledger client initialized with URL: {}", config.ledger_url);

    let store = Arc::new(RoleOverrideStore::new(config.role_overrides_path.clone()));
    let roles = Arc::new(RoleDirectory::new(ledger.clone(), store));
    let app = create_app(AppState::new(ledger, roles));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn run_command(session: &Session, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Products {
            stage,
            role,
            farmer,
            marketplace,
        } => cli::handle_products(session, stage, role, farmer, marketplace).await,
        Commands::Product { id } => cli::handle_product(session, id).await,
        Commands::History {
            product,
            oldest_first,
        } => cli::handle_history(session, product, oldest_first).await,
        Commands::Users => cli::handle_users(session).await,
        Commands::Stats => cli::handle_stats(session).await,
        Commands::Role(RoleCommands::Set { address, role }) => {
            cli::handle_role_set(session, &address, &role).await
        }
        Commands::Role(RoleCommands::Clear { address }) => {
            cli::handle_role_clear(session, &address).await
        }
        Commands::Create { name, base_price } => {
            cli::handle_create(session, &name, &base_price).await
        }
        Commands::Collect {
            id,
            fee,
            district,
            local_body,
            distance_km,
        } => {
            let form = CollectForm {
                collector_fee: fee,
                district,
                local_body,
                distance_km,
            };
            cli::handle_collect(session, id, &form).await
        }
        Commands::Transport { id } => cli::handle_transport(session, id).await,
        Commands::Distribute { id, fee } => cli::handle_distribute(session, id, &fee).await,
        Commands::Retail { id, fee } => cli::handle_retail(session, id, &fee).await,
        Commands::Checkout { ids } => {
            let result = cli::handle_checkout(session, &ids).await?;
            if !result.success {
                anyhow::bail!("checkout did not complete");
            }
            Ok(())
        }
        Commands::Revert { id } => cli::handle_revert(session, id).await,
        Commands::Serve | Commands::Config | Commands::Demo => Ok(()),
    }
}
