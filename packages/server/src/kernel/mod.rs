//! Process-wide infrastructure: the dependency bundle, the NATS bus seam,
//! the PII cipher, distributed locks and the job queue.

pub mod bus;
pub mod cache;
pub mod cipher;
pub mod jobs;
pub mod kernel;
pub mod locks;

pub use bus::{BusPublisher, NatsBus, TestBus, BROADCAST_CHANNEL};
pub use cache::{Cache, InMemoryCache, NoopCache};
pub use cipher::{Cipher, DocumentDigest};
pub use kernel::AppKernel;
pub use locks::LeaseLock;
