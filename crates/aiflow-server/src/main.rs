use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use aiflow_server::config::ServerConfig;
use aiflow_server::{build_runtime, configure, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting aiflow server");

    let config = ServerConfig::load()?;
    let runtime = build_runtime(&config);
    info!(
        "Runtime initialized with node types: {}",
        runtime.registry().list_node_types().join(", ")
    );

    let app_state = web::Data::new(AppState::new(runtime));
    let bind_address = config.bind_address.clone();
    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
