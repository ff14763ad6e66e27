// Re-export the recording store
pub mod recording_store;
pub use recording_store::RecordingGraphStore;
