use std::fmt;

#[derive(Debug)]
pub enum StoreErr {
    PgPool(r2d2::Error),
    Pg(postgres::Error),
    Worker(tokio::task::JoinError),
    Unavailable(String),
}

impl std::error::Error for StoreErr {}

impl fmt::Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use StoreErr::*;
        let msg = match self {
            PgPool(e) => format!("could not get a Postgres connection: {}", e),
            Pg(e) => format!("Postgres query failed: {}", e),
            Worker(e) => format!("store query did not complete: {}", e),
            Unavailable(why) => format!("message store unavailable: {}", why),
        };
        write!(f, "{}", msg)
    }
}

impl From<r2d2::Error> for StoreErr {
    fn from(e: r2d2::Error) -> Self {
        Self::PgPool(e)
    }
}
impl From<postgres::Error> for StoreErr {
    fn from(e: postgres::Error) -> Self {
        Self::Pg(e)
    }
}
impl From<tokio::task::JoinError> for StoreErr {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e)
    }
}
