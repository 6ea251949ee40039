//! # Standard Tool Library
//!
//! Small deterministic tools shipped with the runtime. They are useful on
//! their own and as fixtures for flows that need a tool without any I/O.
//!
//! ```rust
//! use concerto_tools::standard;
//!
//! let tools = standard::all();
//! let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
//! assert_eq!(names, vec!["echo", "add", "text_transform"]);
//! ```

mod add;
mod echo;
mod text;

pub use add::AddTool;
pub use echo::EchoTool;
pub use text::{TextOperation, TextTransformTool};

use crate::local::LocalTool;
use std::sync::Arc;

/// Every standard tool, in registration order.
pub fn all() -> Vec<Arc<dyn LocalTool>> {
    vec![
        Arc::new(EchoTool::new()),
        Arc::new(AddTool::new()),
        Arc::new(TextTransformTool::new()),
    ]
}
