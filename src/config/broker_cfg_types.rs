use crate::from_env_var;
use std::num::NonZeroUsize;
use std::time::Duration;

from_env_var!(
    /// How many recent message ids to keep per user or stream
    let name = MtableSize;
    let default: usize = 400;
    let (env_var, allowed_values) = ("MTABLE_SIZE", "a positive number");
    let from_str = |s| s.parse().ok().filter(|n: &usize| *n > 0);
);

from_env_var!(
    /// How long a client may go without polling before its queue is reclaimed
    let name = QueueTimeout;
    let default: Duration = Duration::from_secs(600);
    let (env_var, allowed_values) = ("QUEUE_TIMEOUT", "a number of seconds");
    let from_str = |s| s.parse().map(Duration::from_secs).ok();
);

from_env_var!(
    /// The time between idle queue sweeps
    let name = GcInterval;
    let default: Duration = Duration::from_secs(300);
    let (env_var, allowed_values) = ("GC_INTERVAL", "a positive number of seconds");
    let from_str = |s| s.parse().ok().filter(|n: &u64| *n > 0).map(Duration::from_secs);
);

from_env_var!(
    /// The secret the persistence tier presents when posting notices
    let name = SharedSecret;
    let default: Option<String> = None;
    let (env_var, allowed_values) = ("SHARED_SECRET", "any string");
    let from_str = |s| Some(Some(s.to_string()));
);

from_env_var!(
    /// How many message bodies to keep in memory
    let name = MessageCacheSize;
    let default: NonZeroUsize = NonZeroUsize::new(2048).expect("hardcoded");
    let (env_var, allowed_values) = ("MESSAGE_CACHE_SIZE", "a positive number");
    let from_str = |s| s.parse().ok();
);
