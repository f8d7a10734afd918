//! Postgres queries
use super::{MessageStore, Result};
use crate::config;
use crate::config::PgSslInner;
use crate::event::{Message, MessageId, UserId};
use crate::response::broker::Key;

use ::postgres::{self, config::SslMode, Row};
use r2d2_postgres::PostgresConnectionManager;

#[derive(Clone, Debug)]
pub struct PgPool {
    pub conn: r2d2::Pool<PostgresConnectionManager<postgres::NoTls>>,
}

impl PgPool {
    /// Connect to Postgres.
    ///
    /// **NOTE**: this makes a synchronous connection, so it must be called before the
    /// async runtime starts.
    pub fn new(pg_cfg: &config::Postgres) -> Result<Self> {
        let mut cfg = postgres::Config::new();
        cfg.user(pg_cfg.user.as_str())
            .host(pg_cfg.host.as_str())
            .port(*pg_cfg.port)
            .dbname(pg_cfg.database.as_str())
            .ssl_mode(match *pg_cfg.ssl_mode {
                PgSslInner::Disable => SslMode::Disable,
                PgSslInner::Prefer => SslMode::Prefer,
            });
        if let Some(password) = &*pg_cfg.password {
            cfg.password(password);
        };

        cfg.connect(postgres::NoTls)?; // Test connection, letting us immediately exit with an error
                                       // when Postgres isn't running instead of timing out below
        let manager = PostgresConnectionManager::new(cfg, postgres::NoTls);
        let pool = r2d2::Pool::builder().max_size(10).build(manager)?;

        Ok(Self { conn: pool })
    }
}

impl MessageStore for PgPool {
    fn recent_message_ids(&self, key: &Key, limit: usize) -> Result<Vec<MessageId>> {
        let mut conn = self.conn.get()?;
        let limit = limit as i64;
        let rows = match key {
            Key::User(user) => conn.query(
                "SELECT message_id FROM zerver_usermessage
  WHERE user_profile_id = $1
ORDER BY message_id DESC
LIMIT $2",
                &[&**user, &limit],
            )?,
            Key::Stream(realm, stream_name) => conn.query(
                "
SELECT zerver_message.id
  FROM zerver_message
INNER JOIN zerver_recipient ON zerver_message.recipient_id = zerver_recipient.id
INNER JOIN zerver_stream ON zerver_recipient.type_id = zerver_stream.id
  WHERE zerver_recipient.type = 2
    AND zerver_stream.realm_id = $1
    AND lower(zerver_stream.name) = $2
ORDER BY zerver_message.id DESC
LIMIT $3",
                &[&**realm, stream_name, &limit],
            )?,
        };
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn messages(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
        let mut conn = self.conn.get()?;
        let rows = conn.query(
            "
SELECT zerver_message.id, zerver_message.sender_id, zerver_client.name,
       zerver_message.subject, zerver_message.content, zerver_message.rendered_content,
       extract(epoch FROM zerver_message.pub_date)::bigint
  FROM zerver_message
INNER JOIN zerver_client ON zerver_message.sending_client_id = zerver_client.id
  WHERE zerver_message.id = ANY($1)",
            &[&ids],
        )?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    fn pointer(&self, user: UserId) -> Result<Option<MessageId>> {
        let mut conn = self.conn.get()?;
        Ok(conn
            .query(
                "SELECT pointer FROM zerver_userprofile WHERE id = $1 LIMIT 1",
                &[&*user],
            )?
            .get(0)
            .map(|row| row.get(0)))
    }
}

fn message_from_row(row: &Row) -> Message {
    Message {
        sender_id: row.get::<_, Option<i64>>(1).map(UserId),
        sending_client: row.get(2),
        subject: row.get(3),
        content: row.get::<_, Option<String>>(4).unwrap_or_default(),
        rendered_content: row.get(5),
        timestamp: row.get(6),
        ..Message::bare(row.get(0))
    }
}
