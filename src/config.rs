//! Configuration from environment variables, optionally merged from a `.env` file.
pub use {
    broker_cfg::Broker, deployment_cfg::Deployment, deployment_cfg_types::EnvInner,
    postgres_cfg::Postgres, postgres_cfg_types::PgSslInner,
};

use self::environmental_variables::EnvVar;
use super::err::FatalErr;
use hashbrown::HashMap;
use std::env;

mod broker_cfg;
mod broker_cfg_types;
mod deployment_cfg;
mod deployment_cfg_types;
mod environmental_variables;
mod postgres_cfg;
mod postgres_cfg_types;

pub fn merge_dotenv() -> Result<(), FatalErr> {
    let env_file = match env::var("ENV").ok().as_deref() {
        Some("production") => ".env.production",
        Some("development") | None => ".env",
        Some(unsupported) => Err(FatalErr::config(
            "ENV",
            unsupported,
            "`production` or `development`",
        ))?,
    };
    match dotenv::from_filename(env_file) {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => {
            FatalErr::log(format!("No {} file found; using the environment as-is", env_file));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn from_env<'a>(
    env_vars: HashMap<String, String>,
) -> Result<(Postgres, Broker, Deployment<'a>), FatalErr> {
    let env_vars = EnvVar::new(env_vars);
    log::info!("Environmental variables the broker received: {}", &env_vars);

    let deployment = Deployment::from_env(&env_vars)?;
    let broker = Broker::from_env(&env_vars)?;
    if *deployment.env == EnvInner::Production && broker.shared_secret.is_none() {
        return Err(FatalErr::config(
            "SHARED_SECRET",
            "unset",
            "set when RUST_ENV is `production`",
        ));
    }
    Ok((Postgres::from_env(env_vars)?, broker, deployment))
}
