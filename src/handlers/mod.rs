mod health;
mod panel;
mod stream;

pub use health::*;
pub use panel::*;
pub use stream::*;
