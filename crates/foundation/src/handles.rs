/// Opaque handles to render-backend resources.
///
/// Handles are plain indices issued by the backend; the foundation crate never
/// dereferences them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshHandle(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(pub u32);
