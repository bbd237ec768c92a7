//! Scenario tests spanning several modules

mod store_properties_test;
