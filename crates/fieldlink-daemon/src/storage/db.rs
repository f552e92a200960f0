//! SQLite database for edge motion events.

fieldlink_core::define_database!(EventDatabase, "Event database migrations complete");
