//! GPU resources owned by one rendering context.
//!
//! Each transport keeps its own bundle: textures filled by upload, a
//! persistent shared allocation with images bound to textures, and images
//! imported from the decoder's own memory keyed by native handle. A bundle
//! is created on first use, reused while its mapping stays the same, and
//! rebuilt (old handles released) when the mapping changes.
//!
//! Upload and shared bundles are overwritten by every frame delivered in
//! the context, so each remembers which frame it currently shows.
//!
//! Nothing here frees on drop: releasing needs the device of the owning
//! context, so teardown is explicit through [`ContextResources::release`].

use std::collections::HashMap;

use cv_common::{
    GlDevice, GpuError, ImageHandle, ImageImport, MappingParameters, NativeHandle,
    PlatformError, SharedBlock, SharedMemory, StrategyError, TextureId, TiledPicture,
};
use cv_convert::PlanarConverter;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Upload textures
// ---------------------------------------------------------------------------

/// Textures filled by sub-region updates, one per plane.
#[derive(Debug)]
pub struct DirectTextures {
    textures: Vec<TextureId>,
    mapping: MappingParameters,
    /// Linear frame converted for upload; empty until the first conversion.
    staging: Vec<u8>,
    frame: Option<u64>,
}

impl DirectTextures {
    /// Create one texture per plane of `mapping`.
    pub fn create(gl: &dyn GlDevice, mapping: MappingParameters) -> Result<Self, GpuError> {
        let textures = create_plane_textures(gl, &mapping)?;
        debug!(
            dims = %mapping.dimensions,
            format = ?mapping.pixel_format,
            count = textures.len(),
            "Created upload textures"
        );
        Ok(Self {
            textures,
            mapping,
            staging: Vec::new(),
            frame: None,
        })
    }

    /// Upload one slice per plane as frame `frame_seq`.
    pub fn upload(
        &mut self,
        gl: &dyn GlDevice,
        planes: &[&[u8]],
        frame_seq: u64,
    ) -> Result<(), GpuError> {
        self.frame = None;
        update_planes(gl, &self.textures, &self.mapping, planes)?;
        self.frame = Some(frame_seq);
        Ok(())
    }

    /// Convert `picture` into the staging frame laid out as this bundle's
    /// mapping, then upload it as frame `frame_seq`.
    pub fn upload_converted(
        &mut self,
        gl: &dyn GlDevice,
        converter: &PlanarConverter,
        picture: &TiledPicture,
        frame_seq: u64,
    ) -> Result<(), GpuError> {
        self.frame = None;
        let total = self.mapping.total_bytes();
        if self.staging.len() != total {
            debug!(bytes = total, "Allocating upload staging frame");
            self.staging = vec![0; total];
        }
        converter.convert(picture, &self.mapping, &mut self.staging);

        let offsets = self.mapping.plane_offsets();
        let planes: Vec<&[u8]> = self
            .mapping
            .planes
            .iter()
            .zip(&offsets)
            .map(|(plane, &offset)| &self.staging[offset..offset + plane.byte_len()])
            .collect();
        update_planes(gl, &self.textures, &self.mapping, &planes)?;
        self.frame = Some(frame_seq);
        Ok(())
    }

    pub fn textures(&self) -> &[TextureId] {
        &self.textures
    }

    pub fn mapping(&self) -> &MappingParameters {
        &self.mapping
    }

    /// Frame the textures currently hold.
    pub fn frame(&self) -> Option<u64> {
        self.frame
    }

    fn release(self, gl: &dyn GlDevice) {
        for tex in self.textures {
            gl.delete_texture(tex);
        }
    }
}

// ---------------------------------------------------------------------------
// Shared allocation target
// ---------------------------------------------------------------------------

/// One persistent shared allocation, its planes imported as images and bound
/// to textures. Frames are delivered by writing the allocation.
#[derive(Debug)]
pub struct SharedTarget {
    block: SharedBlock,
    images: Vec<ImageHandle>,
    textures: Vec<TextureId>,
    mapping: MappingParameters,
    frame: Option<u64>,
}

impl SharedTarget {
    /// Allocate `mapping.total_bytes()` of shared memory and bind every plane
    /// to a texture. Partially created handles are released on failure.
    pub fn create(
        gl: &dyn GlDevice,
        shm: &dyn SharedMemory,
        mapping: MappingParameters,
    ) -> Result<Self, StrategyError> {
        let block = shm.allocate(mapping.total_bytes())?;
        let offsets = mapping.plane_offsets();
        match bind_planes(gl, block.handle(), &offsets, &mapping) {
            Ok((images, textures)) => {
                debug!(
                    dims = %mapping.dimensions,
                    handle = block.handle(),
                    bytes = block.len(),
                    "Created shared import target"
                );
                Ok(Self {
                    block,
                    images,
                    textures,
                    mapping,
                    frame: None,
                })
            }
            Err(err) => {
                shm.free(block);
                Err(err.into())
            }
        }
    }

    pub fn block(&self) -> &SharedBlock {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut SharedBlock {
        &mut self.block
    }

    /// Record the frame the block holds; `None` while it is being written.
    pub fn set_frame(&mut self, frame: Option<u64>) {
        self.frame = frame;
    }

    pub fn frame(&self) -> Option<u64> {
        self.frame
    }

    pub fn textures(&self) -> &[TextureId] {
        &self.textures
    }

    pub fn mapping(&self) -> &MappingParameters {
        &self.mapping
    }

    fn release(self, gl: &dyn GlDevice, shm: Option<&dyn SharedMemory>) {
        release_bound(gl, self.textures, self.images);
        match shm {
            Some(shm) => shm.free(self.block),
            None => warn!(handle = self.block.handle(), "No allocator to free shared block"),
        }
    }
}

// ---------------------------------------------------------------------------
// Native picture imports
// ---------------------------------------------------------------------------

/// Images imported straight from a decoder picture's own memory.
#[derive(Debug)]
pub struct NativeImport {
    images: Vec<ImageHandle>,
    textures: Vec<TextureId>,
    mapping: MappingParameters,
}

impl NativeImport {
    pub fn create(
        gl: &dyn GlDevice,
        handle: NativeHandle,
        mapping: MappingParameters,
    ) -> Result<Self, GpuError> {
        let offsets = [handle.luma_offset, handle.chroma_offset];
        let (images, textures) = bind_planes(gl, handle.id, &offsets, &mapping)?;
        debug!(handle = handle.id, dims = %mapping.dimensions, "Imported native picture");
        Ok(Self {
            images,
            textures,
            mapping,
        })
    }

    pub fn textures(&self) -> &[TextureId] {
        &self.textures
    }

    pub fn mapping(&self) -> &MappingParameters {
        &self.mapping
    }

    fn release(self, gl: &dyn GlDevice) {
        release_bound(gl, self.textures, self.images);
    }
}

// ---------------------------------------------------------------------------
// Per-context bundle
// ---------------------------------------------------------------------------

/// Everything one rendering context holds for the bridge.
#[derive(Debug, Default)]
pub struct ContextResources {
    pub(crate) direct: Option<DirectTextures>,
    pub(crate) shared: Option<SharedTarget>,
    pub(crate) native: HashMap<u64, NativeImport>,
}

impl ContextResources {
    /// Upload textures matching `mapping`, rebuilt if the mapping changed.
    pub fn direct(
        &mut self,
        gl: &dyn GlDevice,
        mapping: &MappingParameters,
    ) -> Result<&mut DirectTextures, GpuError> {
        let textures = match self.direct.take() {
            Some(d) if d.mapping() == mapping => d,
            old => {
                if let Some(old) = old {
                    debug!(dims = %old.mapping().dimensions, "Rebuilding upload textures");
                    old.release(gl);
                }
                DirectTextures::create(gl, mapping.clone())?
            }
        };
        Ok(self.direct.insert(textures))
    }

    /// Shared target matching `mapping`, rebuilt if the mapping changed.
    pub fn shared(
        &mut self,
        gl: &dyn GlDevice,
        shm: Option<&dyn SharedMemory>,
        mapping: &MappingParameters,
    ) -> Result<&mut SharedTarget, StrategyError> {
        let target = match self.shared.take() {
            Some(t) if t.mapping() == mapping => t,
            old => {
                if let Some(old) = old {
                    debug!(dims = %old.mapping().dimensions, "Rebuilding shared import target");
                    old.release(gl, shm);
                }
                let shm = shm.ok_or(PlatformError::NoSharedMemory)?;
                SharedTarget::create(gl, shm, mapping.clone())?
            }
        };
        Ok(self.shared.insert(target))
    }

    /// Import of the picture behind `handle`, created on first sight.
    pub fn native(
        &mut self,
        gl: &dyn GlDevice,
        handle: NativeHandle,
        mapping: &MappingParameters,
    ) -> Result<&NativeImport, GpuError> {
        let import = match self.native.remove(&handle.id) {
            Some(n) if n.mapping() == mapping => n,
            old => {
                if let Some(old) = old {
                    old.release(gl);
                }
                NativeImport::create(gl, handle, mapping.clone())?
            }
        };
        Ok(self.native.entry(handle.id).or_insert(import))
    }

    /// Whether `textures` still show frame `frame_seq`. Native imports
    /// always show their own picture; upload and shared bundles show the
    /// last frame delivered through them.
    pub fn shows_frame(&self, textures: &[TextureId], frame_seq: u64) -> bool {
        if let Some(d) = self.direct.as_ref().filter(|d| d.textures() == textures) {
            return d.frame() == Some(frame_seq);
        }
        if let Some(s) = self.shared.as_ref().filter(|s| s.textures() == textures) {
            return s.frame() == Some(frame_seq);
        }
        self.native.values().any(|n| n.textures() == textures)
    }

    /// Every texture this context holds, in creation-bundle order.
    pub fn texture_ids(&self) -> Vec<TextureId> {
        let mut ids = Vec::new();
        if let Some(d) = &self.direct {
            ids.extend_from_slice(d.textures());
        }
        if let Some(s) = &self.shared {
            ids.extend_from_slice(s.textures());
        }
        for n in self.native.values() {
            ids.extend_from_slice(n.textures());
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_none() && self.shared.is_none() && self.native.is_empty()
    }

    /// Delete every handle through `gl` and return shared allocations.
    pub fn release(self, gl: &dyn GlDevice, shm: Option<&dyn SharedMemory>) {
        if let Some(d) = self.direct {
            d.release(gl);
        }
        if let Some(s) = self.shared {
            s.release(gl, shm);
        }
        for (_, n) in self.native {
            n.release(gl);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn update_planes(
    gl: &dyn GlDevice,
    textures: &[TextureId],
    mapping: &MappingParameters,
    planes: &[&[u8]],
) -> Result<(), GpuError> {
    for ((tex, plane), data) in textures.iter().zip(&mapping.planes).zip(planes) {
        gl.update_texture(*tex, plane.format, plane.width, plane.height, plane.stride, data)?;
    }
    Ok(())
}

fn create_plane_textures(
    gl: &dyn GlDevice,
    mapping: &MappingParameters,
) -> Result<Vec<TextureId>, GpuError> {
    let mut textures = Vec::with_capacity(mapping.planes.len());
    for plane in &mapping.planes {
        match gl.create_texture(plane.format, plane.width, plane.height) {
            Ok(tex) => textures.push(tex),
            Err(err) => {
                for tex in textures {
                    gl.delete_texture(tex);
                }
                return Err(err);
            }
        }
    }
    Ok(textures)
}

/// Import each plane of `handle` as an image and bind it to a new texture.
fn bind_planes(
    gl: &dyn GlDevice,
    handle: u64,
    offsets: &[usize],
    mapping: &MappingParameters,
) -> Result<(Vec<ImageHandle>, Vec<TextureId>), GpuError> {
    let mut images = Vec::with_capacity(mapping.planes.len());
    let mut textures = Vec::with_capacity(mapping.planes.len());
    match bind_each(gl, handle, offsets, mapping, &mut images, &mut textures) {
        Ok(()) => Ok((images, textures)),
        Err(err) => {
            release_bound(gl, textures, images);
            Err(err)
        }
    }
}

fn bind_each(
    gl: &dyn GlDevice,
    handle: u64,
    offsets: &[usize],
    mapping: &MappingParameters,
    images: &mut Vec<ImageHandle>,
    textures: &mut Vec<TextureId>,
) -> Result<(), GpuError> {
    for (plane, offset) in mapping.planes.iter().zip(offsets) {
        let image = gl.import_image(&ImageImport {
            handle,
            offset: *offset,
            width: plane.width,
            height: plane.height,
            stride: plane.stride,
            format: plane.format,
        })?;
        images.push(image);
        let tex = gl.create_texture(plane.format, plane.width, plane.height)?;
        textures.push(tex);
        gl.bind_image(tex, image)?;
    }
    Ok(())
}

fn release_bound(gl: &dyn GlDevice, textures: Vec<TextureId>, images: Vec<ImageHandle>) {
    for tex in textures {
        gl.delete_texture(tex);
    }
    for image in images {
        gl.destroy_image(image);
    }
}
