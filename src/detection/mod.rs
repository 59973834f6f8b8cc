pub mod address;
pub mod classifier;
pub mod gate;

pub use address::extract_address;
pub use classifier::EventClassifier;
pub use gate::EventGate;
