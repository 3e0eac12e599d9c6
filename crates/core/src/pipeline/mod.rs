pub mod backfill;
pub mod live;
