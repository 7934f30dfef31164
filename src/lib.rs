//! Bronze → silver → gold pipeline over the CNPJ open-data dumps.

pub mod acquisition;
pub mod category;
pub mod config;
pub mod discovery;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod gold;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod silver;
pub mod table;

pub use category::Category;
pub use config::{Layout, Settings};
pub use error::{PipelineError, Result};
pub use http::{HttpRemote, Remote};
pub use logging::{RunContext, Stage};
pub use pipeline::Outcome;
