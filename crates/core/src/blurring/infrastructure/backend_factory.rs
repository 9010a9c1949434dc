use crate::blurring::domain::blur_backend::BlurBackend;
use crate::shared::blur_config::BackendPreference;

use super::gpu_blur::AcceleratedBlurBackend;
use super::stack_blur::StackBlurFilter;

/// Resolve a backend preference into a concrete backend.
///
/// The accelerated path is probed here, before the pipeline starts; a
/// failed probe degrades to the stack blur and is only logged. Runtime
/// failures of the returned backend are the orchestrator's problem.
pub fn create_backend(preference: BackendPreference) -> Box<dyn BlurBackend> {
    match preference {
        BackendPreference::Cpu => Box::new(StackBlurFilter::new()),
        BackendPreference::Accelerated => match AcceleratedBlurBackend::probe() {
            Some(accelerated) => {
                log::info!("using accelerated blur backend");
                Box::new(accelerated)
            }
            None => {
                log::info!("no accelerated blur available, using stack blur");
                Box::new(StackBlurFilter::new())
            }
        },
    }
}
