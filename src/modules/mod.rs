pub mod classifier;
pub mod event;
pub mod event_backend;
pub mod event_store;
pub mod feature_extractor;
pub mod forest;
pub mod model_store;
pub mod vocabulary;
