//! Orders and the order lifecycle.

mod lifecycle;
mod state;
mod value_objects;

pub use lifecycle::{Order, OrderParts};
pub use state::{OrderStatus, UnknownOrderStatus};
pub use value_objects::{Money, OrderItem, ProductId};
