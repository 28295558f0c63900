//! Texture import strategies and the fallback chain.
//!
//! A frame reaches the GPU through one of three transports:
//!
//! - **DisplayScaler**: the display engine detiles straight into a shared
//!   allocation that is bound to textures. One hardware job per frame.
//! - **SharedAlloc**: a shared allocation bound to textures, filled either
//!   by the CPU converter (`HostConversion`) or by importing the decoder's
//!   own picture memory still tiled (`NativeTiled`).
//! - **DirectUpload**: textures updated with a sub-region upload of a
//!   linear NV12 frame converted per context (or the raw tiled planes when
//!   the shader detiles). The host-memory view is never involved, so a held
//!   host view does not block texture requests.
//!
//! The transports form a chain. When the active one fails the chain steps
//! down to the next, permanently, and serves the same frame through it.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use cv_common::{
    ContextId, DisplayEngine, GlDevice, MappingParameters, PlatformError, PoolConfig,
    ScalerJob, SharedImportMode, SharedMemory, StrategyError, TextureId, TiledPicture,
    TransferError, TransferResult,
};
use cv_convert::{tiled_mapping, PlanarConverter};
use tracing::{debug, info, warn};

use crate::cache::GpuResourceCache;
use crate::resources::ContextResources;
use crate::select::describe_strategy;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Where a shared-allocation import takes its bytes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SharedSource {
    /// CPU conversion into a persistent shared region.
    HostConversion,
    /// The decoder's own picture memory, imported without a copy.
    NativeTiled,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImportStrategy {
    DisplayScaler,
    SharedAlloc(SharedSource),
    DirectUpload,
}

impl ImportStrategy {
    /// The strategy tried after this one fails.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::DisplayScaler => Some(Self::SharedAlloc(SharedSource::HostConversion)),
            Self::SharedAlloc(_) => Some(Self::DirectUpload),
            Self::DirectUpload => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::DisplayScaler => "display-scaler",
            Self::SharedAlloc(SharedSource::HostConversion) => "shared-alloc(host)",
            Self::SharedAlloc(SharedSource::NativeTiled) => "shared-alloc(native)",
            Self::DirectUpload => "direct-upload",
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::DisplayScaler => 0,
            Self::SharedAlloc(SharedSource::HostConversion) => 1,
            Self::SharedAlloc(SharedSource::NativeTiled) => 2,
            Self::DirectUpload => 3,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => Self::DisplayScaler,
            1 => Self::SharedAlloc(SharedSource::HostConversion),
            2 => Self::SharedAlloc(SharedSource::NativeTiled),
            _ => Self::DirectUpload,
        }
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Platform collaborators
// ---------------------------------------------------------------------------

/// Platform services available to the texture paths.
#[derive(Clone, Default)]
pub struct Platform {
    pub shared_memory: Option<Arc<dyn SharedMemory>>,
    pub display_engine: Option<Arc<dyn DisplayEngine>>,
}

impl Platform {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_shared_memory(mut self, shm: Arc<dyn SharedMemory>) -> Self {
        self.shared_memory = Some(shm);
        self
    }

    pub fn with_display_engine(mut self, engine: Arc<dyn DisplayEngine>) -> Self {
        self.display_engine = Some(engine);
        self
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("shared_memory", &self.shared_memory.is_some())
            .field("display_engine", &self.display_engine.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// The active strategy and its permanent downgrades.
#[derive(Debug)]
pub struct StrategyChain {
    initial: ImportStrategy,
    active: AtomicU8,
    downgrades: AtomicU64,
    fallback: bool,
}

impl StrategyChain {
    pub fn new(initial: ImportStrategy, fallback: bool) -> Self {
        Self {
            initial,
            active: AtomicU8::new(initial.code()),
            downgrades: AtomicU64::new(0),
            fallback,
        }
    }

    /// Pick the first strategy `config` allows on `platform`.
    pub fn resolve(config: &PoolConfig, platform: &Platform) -> ImportStrategy {
        let has_shm = platform.shared_memory.is_some();
        if config.host_fallback {
            ImportStrategy::DirectUpload
        } else if config.use_scaler && platform.display_engine.is_some() && has_shm {
            ImportStrategy::DisplayScaler
        } else if has_shm {
            match config.shared_import {
                SharedImportMode::Disabled => ImportStrategy::DirectUpload,
                SharedImportMode::FromHostConversion => {
                    ImportStrategy::SharedAlloc(SharedSource::HostConversion)
                }
                SharedImportMode::FromNativeTiled => {
                    ImportStrategy::SharedAlloc(SharedSource::NativeTiled)
                }
            }
        } else {
            ImportStrategy::DirectUpload
        }
    }

    pub fn initial(&self) -> ImportStrategy {
        self.initial
    }

    pub fn active(&self) -> ImportStrategy {
        ImportStrategy::from_code(self.active.load(Ordering::Acquire))
    }

    pub fn downgrades(&self) -> u64 {
        self.downgrades.load(Ordering::Relaxed)
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback
    }

    /// Step down from `failed`. Returns the strategy to try next, or `None`
    /// when the chain is exhausted. Each step is logged once.
    pub fn downgrade(&self, failed: ImportStrategy, err: &StrategyError) -> Option<ImportStrategy> {
        let next = failed.next()?;
        match self.active.compare_exchange(
            failed.code(),
            next.code(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.downgrades.fetch_add(1, Ordering::Relaxed);
                warn!(
                    from = %failed,
                    to = %next,
                    error = %err,
                    "Import strategy failed, falling back permanently"
                );
                Some(next)
            }
            // Another caller already stepped down past `failed`.
            Err(current) => Some(ImportStrategy::from_code(current)),
        }
    }
}

// ---------------------------------------------------------------------------
// Importer
// ---------------------------------------------------------------------------

/// Textures holding one frame in one context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureView {
    pub context: ContextId,
    pub textures: Vec<TextureId>,
    pub mapping: MappingParameters,
    /// Transport that produced the view.
    pub strategy: ImportStrategy,
}

impl TextureView {
    /// Whether the consumer must detile in its shader.
    pub fn is_tiled(&self) -> bool {
        self.mapping.is_tiled()
    }
}

/// Delivers frames into textures of the current context.
pub struct Importer {
    chain: StrategyChain,
    platform: Platform,
    converter: PlanarConverter,
    /// Upload or write still-tiled data for shader-side detiling.
    shader_detile: bool,
    /// Direct uploads convert to linear NV12 first.
    direct_linear: bool,
    imports: AtomicU64,
}

impl Importer {
    pub fn new(config: &PoolConfig, platform: Platform, converter: PlanarConverter) -> Self {
        let initial = StrategyChain::resolve(config, &platform);
        let shader_detile = config.shader_detile && !config.host_fallback;
        info!(
            strategy = %initial,
            detail = describe_strategy(initial, shader_detile),
            fallback = config.fallback,
            "Texture import strategy resolved"
        );
        Self {
            chain: StrategyChain::new(initial, config.fallback),
            platform,
            converter,
            shader_detile,
            direct_linear: !shader_detile,
            imports: AtomicU64::new(0),
        }
    }

    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Successful imports so far.
    pub fn imports(&self) -> u64 {
        self.imports.load(Ordering::Relaxed)
    }

    /// Deliver `picture` into textures of the context current on `gl`.
    ///
    /// On failure the chain steps down and the same frame is retried, unless
    /// fallback is disabled, in which case the first failure is returned.
    pub fn import_frame(
        &self,
        picture: &TiledPicture,
        frame_seq: u64,
        gl: &dyn GlDevice,
        cache: &GpuResourceCache,
    ) -> TransferResult<TextureView> {
        let ctx = cache.bind(gl)?;
        let mut strategy = self.chain.active();

        loop {
            // The entry disappears if the context's teardown hook ran after
            // the bind.
            let attempt = cache
                .with_resources(ctx, |res| {
                    self.try_import(strategy, picture, frame_seq, gl, res, cache.shared_memory())
                })
                .ok_or(TransferError::ContextDestroyed { ctx })?;

            match attempt {
                Ok((textures, mapping)) => {
                    self.imports.fetch_add(1, Ordering::Relaxed);
                    return Ok(TextureView {
                        context: ctx,
                        textures,
                        mapping,
                        strategy,
                    });
                }
                Err(err) if !self.chain.fallback_enabled() => {
                    return Err(TransferError::Strategy {
                        strategy: strategy.to_string(),
                        source: err,
                    });
                }
                Err(err) => match self.chain.downgrade(strategy, &err) {
                    Some(next) => strategy = next,
                    None => return Err(TransferError::Exhausted { last: err }),
                },
            }
        }
    }

    fn try_import(
        &self,
        strategy: ImportStrategy,
        picture: &TiledPicture,
        frame_seq: u64,
        gl: &dyn GlDevice,
        res: &mut ContextResources,
        shm: Option<&dyn SharedMemory>,
    ) -> Result<(Vec<TextureId>, MappingParameters), StrategyError> {
        match strategy {
            ImportStrategy::DisplayScaler => self.via_scaler(picture, frame_seq, gl, res, shm),
            ImportStrategy::SharedAlloc(SharedSource::HostConversion) => {
                self.via_shared_conversion(picture, frame_seq, gl, res, shm)
            }
            ImportStrategy::SharedAlloc(SharedSource::NativeTiled) => {
                self.via_native(picture, gl, res)
            }
            ImportStrategy::DirectUpload => self.via_upload(picture, frame_seq, gl, res),
        }
    }

    fn via_scaler(
        &self,
        picture: &TiledPicture,
        frame_seq: u64,
        gl: &dyn GlDevice,
        res: &mut ContextResources,
        shm: Option<&dyn SharedMemory>,
    ) -> Result<(Vec<TextureId>, MappingParameters), StrategyError> {
        let engine = self
            .platform
            .display_engine
            .as_ref()
            .ok_or_else(|| PlatformError::ScalerUnavailable("no display engine".into()))?;
        let memory = picture.memory();
        let src_luma_phys = memory
            .phys_addr(cv_common::picture::LUMA_PLANE)
            .ok_or(PlatformError::NoPhysAddr { plane: 0 })?;
        let src_chroma_phys = memory
            .phys_addr(cv_common::picture::CHROMA_PLANE)
            .ok_or(PlatformError::NoPhysAddr { plane: 1 })?;

        let dims = picture.aligned();
        let mapping = MappingParameters::nv12(dims);
        let target = res.shared(gl, shm, &mapping)?;
        let job = ScalerJob {
            src_luma_phys,
            src_chroma_phys,
            dimensions: dims,
            display: picture.display(),
            dst_phys: target.block().phys_addr(),
            dst_chroma_offset: mapping.plane_offsets()[1],
            dst_stride: mapping.planes[0].stride,
        };
        target.set_frame(None);
        engine.detile(&job)?;
        target.set_frame(Some(frame_seq));
        debug!(pic = %picture.id(), dims = %dims, "Display engine detiled frame");
        Ok((target.textures().to_vec(), mapping))
    }

    fn via_shared_conversion(
        &self,
        picture: &TiledPicture,
        frame_seq: u64,
        gl: &dyn GlDevice,
        res: &mut ContextResources,
        shm: Option<&dyn SharedMemory>,
    ) -> Result<(Vec<TextureId>, MappingParameters), StrategyError> {
        let dims = picture.aligned();
        let mapping = if self.shader_detile {
            tiled_mapping(dims)
        } else {
            MappingParameters::nv12(dims)
        };
        let target = res.shared(gl, shm, &mapping)?;
        target.set_frame(None);
        self.converter
            .convert(picture, &mapping, target.block_mut().as_mut_slice());
        target.set_frame(Some(frame_seq));
        Ok((target.textures().to_vec(), mapping))
    }

    fn via_native(
        &self,
        picture: &TiledPicture,
        gl: &dyn GlDevice,
        res: &mut ContextResources,
    ) -> Result<(Vec<TextureId>, MappingParameters), StrategyError> {
        let handle = picture
            .memory()
            .native_handle()
            .ok_or(PlatformError::NoNativeHandle)?;
        let mapping = tiled_mapping(picture.aligned());
        let import = res.native(gl, handle, &mapping)?;
        Ok((import.textures().to_vec(), mapping))
    }

    fn via_upload(
        &self,
        picture: &TiledPicture,
        frame_seq: u64,
        gl: &dyn GlDevice,
        res: &mut ContextResources,
    ) -> Result<(Vec<TextureId>, MappingParameters), StrategyError> {
        let dims = picture.aligned();
        if self.direct_linear {
            // Textures are NV12 whatever layout the host view uses.
            let mapping = MappingParameters::nv12(dims);
            let textures = res.direct(gl, &mapping)?;
            textures.upload_converted(gl, &self.converter, picture, frame_seq)?;
            Ok((textures.textures().to_vec(), mapping))
        } else {
            let mapping = tiled_mapping(dims);
            let textures = res.direct(gl, &mapping)?;
            textures.upload(gl, &[picture.luma(), picture.chroma()], frame_seq)?;
            Ok((textures.textures().to_vec(), mapping))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::HeapSharedMemory;
    use crate::testing::FakeGl;
    use cv_common::{
        ConverterBackend, GpuError, NativeHandle, OwnedPlanes, PictureId, PixelFormat,
        Resolution, TimeCode,
    };
    use cv_convert::tile_plane;
    use parking_lot::Mutex;

    struct FailingEngine;

    impl DisplayEngine for FailingEngine {
        fn detile(&self, _job: &ScalerJob) -> Result<(), PlatformError> {
            Err(PlatformError::Scaler { status: -1 })
        }
    }

    #[derive(Default)]
    struct RecordingEngine {
        jobs: Mutex<Vec<ScalerJob>>,
    }

    impl DisplayEngine for RecordingEngine {
        fn detile(&self, job: &ScalerJob) -> Result<(), PlatformError> {
            self.jobs.lock().push(*job);
            Ok(())
        }
    }

    fn picture(display: Resolution, native: Option<NativeHandle>) -> TiledPicture {
        let dims = display.aligned();
        let (w, h) = (dims.width as usize, dims.height as usize);
        let luma: Vec<u8> = (0..w * h).map(|i| (i % w) as u8).collect();
        let chroma: Vec<u8> = (0..w * h / 2).map(|i| (i / w) as u8).collect();
        let mut mem = OwnedPlanes::new(
            tile_plane(&luma, w, dims.width, dims.height),
            tile_plane(&chroma, w, dims.width, dims.height / 2),
        )
        .with_phys_addrs(0x1000_0000, 0x2000_0000);
        if let Some(handle) = native {
            mem = mem.with_native_handle(handle);
        }
        TiledPicture::new(Arc::new(mem), display, TimeCode::ZERO, PictureId(1))
    }

    struct Rig {
        gl: FakeGl,
        cache: GpuResourceCache,
        importer: Importer,
    }

    fn rig(config: PoolConfig, platform: Platform) -> Rig {
        let gl = FakeGl::new();
        gl.make_current(1);
        let converter = PlanarConverter::new(ConverterBackend::Scalar);
        Rig {
            gl,
            cache: GpuResourceCache::new(platform.shared_memory.clone()),
            importer: Importer::new(&config, platform, converter),
        }
    }

    impl Rig {
        fn import(&self, pic: &TiledPicture, seq: u64) -> TransferResult<TextureView> {
            self.importer.import_frame(pic, seq, &self.gl, &self.cache)
        }

        fn shows_frame(&self, view: &TextureView, seq: u64) -> bool {
            self.cache
                .with_resources(view.context, |res| res.shows_frame(&view.textures, seq))
                .unwrap_or(false)
        }

        fn shared_bytes(&self) -> Vec<u8> {
            self.cache
                .with_resources(ContextId(1), |res| {
                    res.shared
                        .as_ref()
                        .map(|t| t.block().as_slice().to_vec())
                        .unwrap_or_default()
                })
                .unwrap_or_default()
        }
    }

    fn shm_platform() -> Platform {
        Platform::none().with_shared_memory(Arc::new(HeapSharedMemory::new()))
    }

    // ── Resolution ───────────────────────────────────────────────

    #[test]
    fn resolve_follows_config_and_platform() {
        let mut cfg = PoolConfig::default();
        assert_eq!(
            StrategyChain::resolve(&cfg, &Platform::none()),
            ImportStrategy::DirectUpload
        );

        cfg.shared_import = SharedImportMode::FromNativeTiled;
        assert_eq!(
            StrategyChain::resolve(&cfg, &shm_platform()),
            ImportStrategy::SharedAlloc(SharedSource::NativeTiled)
        );
        // Shared import requested but no allocator.
        assert_eq!(
            StrategyChain::resolve(&cfg, &Platform::none()),
            ImportStrategy::DirectUpload
        );

        cfg.use_scaler = true;
        let full = shm_platform().with_display_engine(Arc::new(RecordingEngine::default()));
        assert_eq!(StrategyChain::resolve(&cfg, &full), ImportStrategy::DisplayScaler);

        cfg.host_fallback = true;
        assert_eq!(StrategyChain::resolve(&cfg, &full), ImportStrategy::DirectUpload);
    }

    #[test]
    fn chain_order() {
        assert_eq!(
            ImportStrategy::DisplayScaler.next(),
            Some(ImportStrategy::SharedAlloc(SharedSource::HostConversion))
        );
        assert_eq!(
            ImportStrategy::SharedAlloc(SharedSource::NativeTiled).next(),
            Some(ImportStrategy::DirectUpload)
        );
        assert_eq!(ImportStrategy::DirectUpload.next(), None);
    }

    // ── Transports ───────────────────────────────────────────────

    #[test]
    fn direct_upload_creates_textures_once() {
        let rig = rig(PoolConfig::default(), Platform::none());
        let pic = picture(Resolution::new(64, 32), None);
        let a = rig.import(&pic, 1).unwrap();
        let b = rig.import(&pic, 2).unwrap();
        assert_eq!(a.textures, b.textures);
        assert_eq!(a.mapping.pixel_format, PixelFormat::Nv12);
        assert_eq!(rig.gl.live_textures(), 2);
        assert_eq!(rig.gl.uploads(), 4);
        // Luma row 0 is the column index.
        let luma = rig.gl.contents(a.textures[0]).unwrap();
        assert_eq!(&luma[..4], &[0, 1, 2, 3]);
    }

    #[test]
    fn direct_upload_tiled_for_shader_detile() {
        let cfg = PoolConfig {
            shader_detile: true,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, Platform::none());
        let pic = picture(Resolution::new(48, 40), None);
        let view = rig.import(&pic, 1).unwrap();
        assert!(view.is_tiled());
        assert_eq!(rig.gl.contents(view.textures[0]).unwrap(), pic.luma());
    }

    #[test]
    fn shared_conversion_writes_allocation() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromHostConversion,
            ..PoolConfig::default()
        };
        let shm = Arc::new(HeapSharedMemory::new());
        let rig = rig(cfg, Platform::none().with_shared_memory(shm.clone()));
        let pic = picture(Resolution::new(64, 32), None);
        let view = rig.import(&pic, 1).unwrap();
        rig.import(&pic, 2).unwrap();
        assert_eq!(view.strategy, ImportStrategy::SharedAlloc(SharedSource::HostConversion));
        assert_eq!(shm.live_blocks(), 1);
        assert_eq!(rig.gl.live_images(), 2);
        let imports = rig.gl.imports();
        assert_eq!(imports[1].offset, 64 * 32);
        assert_eq!(imports[1].stride, 64);
    }

    #[test]
    fn shared_conversion_keeps_tiles_for_shader_detile() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromHostConversion,
            shader_detile: true,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, shm_platform());
        let pic = picture(Resolution::new(48, 40), None);
        let view = rig.import(&pic, 1).unwrap();

        assert_eq!(view.strategy, ImportStrategy::SharedAlloc(SharedSource::HostConversion));
        assert!(view.is_tiled());
        assert_eq!(view.mapping, tiled_mapping(pic.aligned()));
        let mut expected = pic.luma().to_vec();
        expected.extend_from_slice(pic.chroma());
        assert_eq!(rig.shared_bytes(), expected);
        assert_eq!(rig.gl.uploads(), 0);
    }

    #[test]
    fn native_import_is_cached_per_handle() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromNativeTiled,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, shm_platform());
        let handle = NativeHandle {
            id: 42,
            luma_offset: 0,
            chroma_offset: 4096,
        };
        let pic = picture(Resolution::new(48, 40), Some(handle));
        let a = rig.import(&pic, 1).unwrap();
        let b = rig.import(&pic, 2).unwrap();
        assert_eq!(a.textures, b.textures);
        assert!(a.is_tiled());
        assert_eq!(rig.gl.imports().len(), 2);
        assert_eq!(rig.gl.imports()[1].offset, 4096);
    }

    #[test]
    fn scaler_job_targets_shared_block() {
        let cfg = PoolConfig {
            use_scaler: true,
            ..PoolConfig::default()
        };
        let engine = Arc::new(RecordingEngine::default());
        let rig = rig(cfg, shm_platform().with_display_engine(engine.clone()));
        let pic = picture(Resolution::HD, None);
        let view = rig.import(&pic, 1).unwrap();
        assert_eq!(view.strategy, ImportStrategy::DisplayScaler);
        let jobs = engine.jobs.lock();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].src_luma_phys, 0x1000_0000);
        assert_eq!(jobs[0].dst_chroma_offset, 1920 * 1080);
        assert_eq!(jobs[0].dst_stride, 1920);
    }

    // ── Delivered frames ─────────────────────────────────────────

    #[test]
    fn upload_bundle_tracks_last_frame() {
        let rig = rig(PoolConfig::default(), Platform::none());
        let pic = picture(Resolution::new(64, 32), None);
        let a = rig.import(&pic, 1).unwrap();
        assert!(rig.shows_frame(&a, 1));
        let b = rig.import(&pic, 2).unwrap();
        assert_eq!(a.textures, b.textures);
        assert!(!rig.shows_frame(&a, 1));
        assert!(rig.shows_frame(&b, 2));
    }

    #[test]
    fn shared_bundle_tracks_last_frame() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromHostConversion,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, shm_platform());
        let pic = picture(Resolution::new(64, 32), None);
        let a = rig.import(&pic, 7).unwrap();
        rig.import(&pic, 8).unwrap();
        assert!(!rig.shows_frame(&a, 7));
        assert!(rig.shows_frame(&a, 8));
    }

    #[test]
    fn failed_upload_shows_no_frame() {
        let cfg = PoolConfig {
            fallback: false,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, Platform::none());
        let pic = picture(Resolution::new(64, 32), None);
        let view = rig.import(&pic, 1).unwrap();
        rig.gl.set_fail_upload(true);
        rig.import(&pic, 2).unwrap_err();
        assert!(!rig.shows_frame(&view, 1));
        assert!(!rig.shows_frame(&view, 2));
    }

    #[test]
    fn native_import_always_shows_its_picture() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromNativeTiled,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, shm_platform());
        let handle = NativeHandle {
            id: 3,
            luma_offset: 0,
            chroma_offset: 4096,
        };
        let view = rig.import(&picture(Resolution::new(48, 40), Some(handle)), 1).unwrap();
        assert!(rig.shows_frame(&view, 1));
        assert!(rig.shows_frame(&view, 99));
    }

    // ── Context teardown ─────────────────────────────────────────

    #[test]
    fn context_destroyed_during_import_is_reported() {
        let rig = rig(PoolConfig::default(), Platform::none());
        rig.gl.set_destroy_on_register(true);
        let err = rig.import(&picture(Resolution::new(64, 32), None), 1).unwrap_err();
        assert_eq!(err, TransferError::ContextDestroyed { ctx: ContextId(1) });
        assert_eq!(rig.gl.live_textures(), 0);
    }

    // ── Fallback ─────────────────────────────────────────────────

    #[test]
    fn scaler_failure_falls_back_permanently() {
        let cfg = PoolConfig {
            use_scaler: true,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, shm_platform().with_display_engine(Arc::new(FailingEngine)));
        let pic = picture(Resolution::new(64, 32), None);
        let view = rig.import(&pic, 1).unwrap();
        assert_eq!(view.strategy, ImportStrategy::SharedAlloc(SharedSource::HostConversion));
        rig.import(&pic, 2).unwrap();
        assert_eq!(rig.importer.chain().downgrades(), 1);
        assert_eq!(rig.importer.chain().initial(), ImportStrategy::DisplayScaler);
    }

    #[test]
    fn missing_native_handle_falls_to_upload() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromNativeTiled,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, shm_platform());
        let view = rig.import(&picture(Resolution::new(64, 32), None), 1).unwrap();
        assert_eq!(view.strategy, ImportStrategy::DirectUpload);
    }

    #[test]
    fn disabled_fallback_reports_first_failure() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromHostConversion,
            fallback: false,
            ..PoolConfig::default()
        };
        let rig = rig(cfg, shm_platform());
        rig.gl.set_fail_import(true);
        let err = rig.import(&picture(Resolution::new(64, 32), None), 1).unwrap_err();
        assert_eq!(
            err,
            TransferError::Strategy {
                strategy: "shared-alloc(host)".into(),
                source: StrategyError::Gpu(GpuError::ImageImport("injected".into())),
            }
        );
        assert_eq!(rig.importer.chain().downgrades(), 0);
    }

    #[test]
    fn exhausted_chain_returns_last_error() {
        let rig = rig(PoolConfig::default(), Platform::none());
        rig.gl.set_fail_upload(true);
        let err = rig.import(&picture(Resolution::new(64, 32), None), 1).unwrap_err();
        assert!(matches!(err, TransferError::Exhausted { .. }));
    }

    #[test]
    fn failed_shared_target_leaves_nothing_behind() {
        let cfg = PoolConfig {
            shared_import: SharedImportMode::FromHostConversion,
            ..PoolConfig::default()
        };
        let shm = Arc::new(HeapSharedMemory::new());
        let rig = rig(cfg, Platform::none().with_shared_memory(shm.clone()));
        rig.gl.set_fail_import(true);
        let view = rig.import(&picture(Resolution::new(64, 32), None), 1).unwrap();
        assert_eq!(view.strategy, ImportStrategy::DirectUpload);
        assert_eq!(shm.live_blocks(), 0);
        assert_eq!(rig.gl.live_images(), 0);
    }
}
