//! Order creation saga constants.

/// The saga type identifier for order creation.
pub const SAGA_TYPE: &str = "OrderCreation";

/// Step name: Resolve or register the customer.
pub const STEP_RESOLVE_CUSTOMER: &str = "resolve_customer";

/// Step name: Check stock for every line.
pub const STEP_CHECK_STOCK: &str = "check_stock";

/// Step name: Insert the order header.
pub const STEP_INSERT_ORDER: &str = "insert_order";

/// Step name: Insert the order lines.
pub const STEP_INSERT_ITEMS: &str = "insert_items";

/// Step name: Deduct stock through the ledger.
pub const STEP_DEDUCT_STOCK: &str = "deduct_stock";

/// Movement reason written for deductions made by this saga.
pub const DEDUCTION_REASON: &str = "order created";
