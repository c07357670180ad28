pub mod batch_pool;
pub mod swap_plan;

pub use batch_pool::BatchPool;
pub use swap_plan::{SwapLeg, plan_swap_legs};
