/// Per-key mutation tag carried by every cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackState {
    /// Read, unchanged.
    None,
    /// New in this layer.
    Added,
    /// Existed below, modified here.
    Changed,
    /// Existed below, removed here.
    Deleted,
}
