pub mod inspect;
pub mod run;
pub mod utils;

pub use inspect::{check_config, init, parse_focus, show_store};
pub use run::run_engine;
