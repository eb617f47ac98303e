pub use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
