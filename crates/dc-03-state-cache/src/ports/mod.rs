mod store;

pub use store::{BatchOp, Store, StoreView, WriteBatch};
