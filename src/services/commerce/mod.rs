/// Commerce services module - course carts
pub mod cart_service;

// Re-export services for convenience
pub use cart_service::{AddCartItemInput, CartService};
