//! SQLite database for the Fieldlink central registry.

fieldlink_core::define_database!(RegistryDatabase, "Registry database migrations complete");
