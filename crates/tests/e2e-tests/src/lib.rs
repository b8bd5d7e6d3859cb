pub mod server;

pub use server::{MockAnalysisServer, Scripted};
