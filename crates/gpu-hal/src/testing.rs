//! In-memory [`GlDevice`] for tests.
//!
//! `FakeGl` hands out texture and image names, remembers which context owns
//! each texture, keeps the packed contents of every upload and runs
//! destruction hooks when a test destroys a context. Failures can be
//! injected per operation. Enabled for downstream crates by the `test-util`
//! feature.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use cv_common::{
    ContextDestroyHook, ContextId, GlDevice, GpuError, ImageHandle, ImageImport, PlaneFormat,
    TextureId,
};

#[derive(Default)]
struct State {
    current: Option<ContextId>,
    next_texture: u32,
    next_image: u64,
    textures: HashMap<TextureId, ContextId>,
    images: HashSet<ImageHandle>,
    imports: Vec<ImageImport>,
    contents: HashMap<TextureId, Vec<u8>>,
    uploads: usize,
    hooks_registered: usize,
    fail_import: bool,
    fail_upload: bool,
    destroy_on_register: bool,
}

#[derive(Default)]
pub struct FakeGl {
    state: RefCell<State>,
    hooks: RefCell<Vec<(ContextId, ContextDestroyHook)>>,
}

impl FakeGl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device with `ctx` already current.
    pub fn with_context(ctx: u64) -> Self {
        let gl = Self::default();
        gl.make_current(ctx);
        gl
    }

    pub fn make_current(&self, ctx: u64) {
        self.state.borrow_mut().current = Some(ContextId(ctx));
    }

    /// The current context disappears without its destruction hooks running
    /// and `replacement` becomes current.
    pub fn lose_context(&self, replacement: u64) {
        self.make_current(replacement);
    }

    /// Destroy `ctx`, running its hooks against this device.
    pub fn destroy_context(&self, ctx: u64) {
        let ctx = ContextId(ctx);
        let hooks: Vec<ContextDestroyHook> = {
            let mut all = self.hooks.borrow_mut();
            let (mine, rest): (Vec<_>, Vec<_>) = all.drain(..).partition(|(c, _)| *c == ctx);
            *all = rest;
            mine.into_iter().map(|(_, h)| h).collect()
        };
        for hook in hooks {
            hook(self);
        }
        let mut state = self.state.borrow_mut();
        if state.current == Some(ctx) {
            state.current = None;
        }
    }

    pub fn set_fail_import(&self, fail: bool) {
        self.state.borrow_mut().fail_import = fail;
    }

    pub fn set_fail_upload(&self, fail: bool) {
        self.state.borrow_mut().fail_upload = fail;
    }

    /// Run every destruction hook as soon as it is registered, as a platform
    /// does for a context that is already going away.
    pub fn set_destroy_on_register(&self, destroy: bool) {
        self.state.borrow_mut().destroy_on_register = destroy;
    }

    pub fn hook_count(&self) -> usize {
        self.state.borrow().hooks_registered
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_images(&self) -> usize {
        self.state.borrow().images.len()
    }

    pub fn uploads(&self) -> usize {
        self.state.borrow().uploads
    }

    pub fn imports(&self) -> Vec<ImageImport> {
        self.state.borrow().imports.clone()
    }

    pub fn texture_context(&self, tex: TextureId) -> Option<ContextId> {
        self.state.borrow().textures.get(&tex).copied()
    }

    /// Live textures owned by `ctx`.
    pub fn textures_of(&self, ctx: u64) -> HashSet<TextureId> {
        self.state
            .borrow()
            .textures
            .iter()
            .filter(|(_, c)| c.0 == ctx)
            .map(|(t, _)| *t)
            .collect()
    }

    /// Rows of the last upload into `tex`, packed without stride padding.
    pub fn contents(&self, tex: TextureId) -> Option<Vec<u8>> {
        self.state.borrow().contents.get(&tex).cloned()
    }
}

impl GlDevice for FakeGl {
    fn current_context(&self) -> Option<ContextId> {
        self.state.borrow().current
    }

    fn on_context_destroyed(&self, ctx: ContextId, hook: ContextDestroyHook) {
        let run_now = {
            let mut state = self.state.borrow_mut();
            state.hooks_registered += 1;
            state.destroy_on_register
        };
        if run_now {
            hook(self);
        } else {
            self.hooks.borrow_mut().push((ctx, hook));
        }
    }

    fn create_texture(
        &self,
        _format: PlaneFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError> {
        let mut state = self.state.borrow_mut();
        let Some(ctx) = state.current else {
            return Err(GpuError::TextureCreation {
                width,
                height,
                reason: "no context".into(),
            });
        };
        state.next_texture += 1;
        let tex = TextureId(state.next_texture);
        state.textures.insert(tex, ctx);
        Ok(tex)
    }

    fn update_texture(
        &self,
        texture: TextureId,
        format: PlaneFormat,
        width: u32,
        height: u32,
        stride: u32,
        data: &[u8],
    ) -> Result<(), GpuError> {
        let mut state = self.state.borrow_mut();
        if state.fail_upload {
            return Err(GpuError::Upload("injected".into()));
        }
        if !state.textures.contains_key(&texture) {
            return Err(GpuError::Upload(format!("unknown texture {texture:?}")));
        }
        let row = (width * format.bytes_per_texel()) as usize;
        let mut packed = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * stride as usize;
            packed.extend_from_slice(&data[start..start + row]);
        }
        state.contents.insert(texture, packed);
        state.uploads += 1;
        Ok(())
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        state.contents.remove(&texture);
    }

    fn import_image(&self, desc: &ImageImport) -> Result<ImageHandle, GpuError> {
        let mut state = self.state.borrow_mut();
        if state.fail_import {
            return Err(GpuError::ImageImport("injected".into()));
        }
        state.next_image += 1;
        let image = ImageHandle(state.next_image);
        state.images.insert(image);
        state.imports.push(*desc);
        Ok(image)
    }

    fn bind_image(&self, texture: TextureId, image: ImageHandle) -> Result<(), GpuError> {
        let state = self.state.borrow();
        if state.textures.contains_key(&texture) && state.images.contains(&image) {
            Ok(())
        } else {
            Err(GpuError::ImageBind(format!("{texture:?} / {image:?}")))
        }
    }

    fn destroy_image(&self, image: ImageHandle) {
        self.state.borrow_mut().images.remove(&image);
    }
}
