//! `SQLite` database handle for the Ember server.

ember_core::define_database!(AppDatabase, "App database migrations complete");
