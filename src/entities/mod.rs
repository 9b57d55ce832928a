pub mod cart;
pub mod cart_item;
pub mod catalog_item;
pub mod order;
pub mod order_item;
pub mod org_inventory;
pub mod requested_item;
pub mod supply_request;
