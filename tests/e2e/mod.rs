mod handlers;
mod invariants;
mod scenarios;
