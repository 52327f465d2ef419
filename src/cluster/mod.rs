pub(crate) mod aggregator;
pub(crate) mod local;
pub(crate) mod publisher;
pub(crate) mod snapshot;
pub(crate) mod store;
