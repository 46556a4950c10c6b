mod poll;

pub use poll::SyncLoop;
