//! Seam to the rendering pipeline.
//!
//! Layers never talk to a graphics API directly. They create tile meshes,
//! upload tile imagery and issue draws through [`RenderBackend`];
//! [`RecordingBackend`] keeps those calls as data.

use foundation::{MeshHandle, TextureHandle};
use scene::CameraUniforms;
use streaming::TileCoord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Pixel buffer does not match `size * size * 4` bytes.
    BadTextureSize { expected: usize, actual: usize },
    UploadFailed(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::BadTextureSize { expected, actual } => {
                write!(f, "texture expects {expected} bytes, got {actual}")
            }
            BackendError::UploadFailed(msg) => write!(f, "texture upload failed: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

pub trait RenderBackend {
    /// Geometry covering one tile of the Mercator grid.
    fn create_tile_mesh(&mut self, coord: TileCoord) -> MeshHandle;

    /// Uploads a square RGBA image `size` pixels on a side.
    fn upload_texture(&mut self, rgba: &[u8], size: u32) -> Result<TextureHandle, BackendError>;

    fn release_mesh(&mut self, mesh: MeshHandle);

    fn release_texture(&mut self, texture: TextureHandle);

    fn draw(&mut self, mesh: MeshHandle, texture: TextureHandle, camera: &CameraUniforms);
}

/// One call made against a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    CreateMesh {
        mesh: MeshHandle,
        coord: TileCoord,
    },
    UploadTexture {
        texture: TextureHandle,
        size: u32,
    },
    ReleaseMesh(MeshHandle),
    ReleaseTexture(TextureHandle),
    Draw {
        mesh: MeshHandle,
        texture: TextureHandle,
        camera: CameraUniforms,
    },
}

/// Headless backend that records calls and hands out sequential handles.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_mesh: u32,
    next_texture: u32,
    commands: Vec<RenderCommand>,
    live_meshes: usize,
    live_textures: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Draw { .. }))
            .count()
    }

    pub fn live_meshes(&self) -> usize {
        self.live_meshes
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures
    }
}

impl RenderBackend for RecordingBackend {
    fn create_tile_mesh(&mut self, coord: TileCoord) -> MeshHandle {
        let mesh = MeshHandle(self.next_mesh);
        self.next_mesh += 1;
        self.live_meshes += 1;
        self.commands.push(RenderCommand::CreateMesh { mesh, coord });
        mesh
    }

    fn upload_texture(&mut self, rgba: &[u8], size: u32) -> Result<TextureHandle, BackendError> {
        let expected = size as usize * size as usize * 4;
        if rgba.len() != expected {
            return Err(BackendError::BadTextureSize {
                expected,
                actual: rgba.len(),
            });
        }
        let texture = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.live_textures += 1;
        self.commands.push(RenderCommand::UploadTexture { texture, size });
        Ok(texture)
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        self.live_meshes = self.live_meshes.saturating_sub(1);
        self.commands.push(RenderCommand::ReleaseMesh(mesh));
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.live_textures = self.live_textures.saturating_sub(1);
        self.commands.push(RenderCommand::ReleaseTexture(texture));
    }

    fn draw(&mut self, mesh: MeshHandle, texture: TextureHandle, camera: &CameraUniforms) {
        self.commands.push(RenderCommand::Draw {
            mesh,
            texture,
            camera: *camera,
        });
    }
}
