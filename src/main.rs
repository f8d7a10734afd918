use pollgate::config;
use pollgate::err::FatalErr;
use pollgate::request::Handler;
use pollgate::response::broker::{self, Broker, ServerGeneration};
use pollgate::response::PgPool;

use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

fn main() -> Result<(), FatalErr> {
    config::merge_dotenv()?;
    pretty_env_logger::try_init()?;
    let (postgres_cfg, broker_cfg, cfg) = config::from_env(dotenv::vars().collect())?;

    // The Postgres client is synchronous; connect before the runtime starts.
    let pg_pool = PgPool::new(&postgres_cfg)?;
    let generation = ServerGeneration::at_startup();
    log::info!("Starting server generation {}", generation);
    let shared_broker = Broker::new(&broker_cfg, generation, Arc::new(pg_pool)).into_arc();

    let request = Handler::new(shared_broker.clone(), &broker_cfg);
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(cfg.cors.allowed_methods.clone())
        .allow_headers(cfg.cors.allowed_headers.clone());
    let routes = request.routes().with(cors);

    let server_addr = SocketAddr::new(*cfg.address, *cfg.port);
    let gc_interval = *broker_cfg.gc_interval;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        tokio::spawn(broker::collect_idle_queues(shared_broker, gc_interval));
        log::info!("Listening on {}", server_addr);
        warp::serve(routes).run(server_addr).await;
    });
    Err(FatalErr::Unrecoverable)
}
