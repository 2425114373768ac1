//! Client-side half of the task list: a typed HTTP client, the debounced
//! search input, the pure view pipeline, and the controller tying them
//! together.

pub mod api;
pub mod controller;
pub mod debounce;
pub mod view;

pub use api::{ClientError, TaskApiClient, TaskInput};
pub use controller::TaskListController;
pub use view::{derive_view, SortKey, ViewQuery};
