pub mod blob;
pub mod blob_detector;
pub mod link;
pub mod stereo;
pub mod tracker;
pub mod union_find;
pub mod workspace;
