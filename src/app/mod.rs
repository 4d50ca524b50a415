pub mod shell;

pub use shell::{Mode, Shell};
