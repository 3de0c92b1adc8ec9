mod borrowing;
mod stats_interval;
