mod dispatch_flow;
mod legacy_database;
mod persistence;
