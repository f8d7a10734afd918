use super::{broker_cfg_types::*, EnvVar};
use crate::err::FatalErr;

/// Sizes and timeouts for the broker's in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct Broker {
    pub mtable_size: MtableSize,
    pub queue_timeout: QueueTimeout,
    pub gc_interval: GcInterval,
    pub shared_secret: SharedSecret,
    pub message_cache_size: MessageCacheSize,
}

impl Broker {
    pub(crate) fn from_env(env: &EnvVar) -> Result<Self, FatalErr> {
        let cfg = Self {
            mtable_size: MtableSize::default().maybe_update(env.get("MTABLE_SIZE"))?,
            queue_timeout: QueueTimeout::default().maybe_update(env.get("QUEUE_TIMEOUT"))?,
            gc_interval: GcInterval::default().maybe_update(env.get("GC_INTERVAL"))?,
            shared_secret: SharedSecret::default().maybe_update(env.get("SHARED_SECRET"))?,
            message_cache_size: MessageCacheSize::default()
                .maybe_update(env.get("MESSAGE_CACHE_SIZE"))?,
        };
        log::info!(
            "Broker configuration: mtable size {}, queue timeout {:?}, sweep every {:?}, {} cached messages",
            *cfg.mtable_size,
            *cfg.queue_timeout,
            *cfg.gc_interval,
            *cfg.message_cache_size
        );
        Ok(cfg)
    }
}
