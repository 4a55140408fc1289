//! SeaORM entity definitions for PostgreSQL database.

pub mod build_artifact;
pub mod deploy_test_run;
pub mod parameter_set;
pub mod system_setting;
pub mod test_item;
