/// A trait that accepts output data for later processing
pub trait Sink<T> {
    fn append(&mut self, value: T);
}

/// A Sink type for accepting value references
pub trait SinkRef<T: ?Sized> {
    fn append(&mut self, value: &T);
}

/// A frame of audio data, consisting of (Left, Right) unsigned 8-bit samples
/// centered at 0x80.
pub type StereoFrame = (u8, u8);
