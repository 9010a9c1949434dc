use crate::shared::exclusion_bands::ExclusionBands;

/// Resolution is going to be blurred away anyway, so a heavy downscale is
/// the default; it mostly buys blur speed and a smaller allocation.
pub const DEFAULT_DOWNSCALE_FACTOR: f32 = 4.0;

/// Default blur window radius.
pub const DEFAULT_RADIUS: u32 = 8;

/// Which blur implementation the caller would like to run.
///
/// `Accelerated` is a preference, not a promise: when the accelerated path
/// is unavailable or fails at runtime, the CPU stack blur is substituted
/// silently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendPreference {
    Cpu,
    Accelerated,
}

/// Immutable per-request configuration, built once before a task starts.
///
/// Out-of-range values are clamped at build time rather than rejected:
/// a negative radius degrades to 0 (no blur) and a sub-1.0 factor to 1.0
/// (no downscale), so malformed configuration never causes a runtime
/// failure.
#[derive(Clone, Debug, PartialEq)]
pub struct BlurConfig {
    radius: u32,
    downscale_factor: f32,
    bands: ExclusionBands,
    backend: BackendPreference,
    instrumentation: bool,
}

impl BlurConfig {
    pub fn builder() -> BlurConfigBuilder {
        BlurConfigBuilder::default()
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn downscale_factor(&self) -> f32 {
        self.downscale_factor
    }

    pub fn bands(&self) -> ExclusionBands {
        self.bands
    }

    pub fn backend(&self) -> BackendPreference {
        self.backend
    }

    pub fn instrumentation(&self) -> bool {
        self.instrumentation
    }
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone, Debug)]
pub struct BlurConfigBuilder {
    radius: i32,
    downscale_factor: f32,
    bands: ExclusionBands,
    backend: BackendPreference,
    instrumentation: bool,
}

impl Default for BlurConfigBuilder {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS as i32,
            downscale_factor: DEFAULT_DOWNSCALE_FACTOR,
            bands: ExclusionBands::NONE,
            backend: BackendPreference::Cpu,
            instrumentation: false,
        }
    }
}

impl BlurConfigBuilder {
    pub fn radius(mut self, radius: i32) -> Self {
        self.radius = radius;
        self
    }

    pub fn downscale_factor(mut self, factor: f32) -> Self {
        self.downscale_factor = factor;
        self
    }

    pub fn bands(mut self, bands: ExclusionBands) -> Self {
        self.bands = bands;
        self
    }

    pub fn backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    pub fn instrumentation(mut self, enabled: bool) -> Self {
        self.instrumentation = enabled;
        self
    }

    pub fn build(self) -> BlurConfig {
        let factor = if self.downscale_factor.is_finite() && self.downscale_factor >= 1.0 {
            self.downscale_factor
        } else {
            1.0
        };
        BlurConfig {
            radius: self.radius.max(0) as u32,
            downscale_factor: factor,
            bands: self.bands,
            backend: self.backend,
            instrumentation: self.instrumentation,
        }
    }
}
