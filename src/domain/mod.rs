pub mod decision;
pub mod resource;
pub mod site;
pub mod task;
pub mod unit;

pub use decision::*;
pub use resource::*;
pub use site::*;
pub use task::*;
pub use unit::*;
