//! Behavioural scenarios for pruning leaked functions.

mod prune;
