//! Stream-copy concatenation of normalized clips.

use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::filters::concat_list;
use crate::worker::TranscodeWorker;

/// Scratch name of the concat list.
pub const CONCAT_LIST: &str = "list.txt";
/// Scratch name of the assembled video.
pub const ASSEMBLED_OUTPUT: &str = "assembled.mp4";

/// Scratch name of the `index`-th clip.
pub fn clip_file_name(index: usize) -> String {
    format!("clip_{index:03}.mp4")
}

/// Joins normalized clips in order with the concat demuxer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatAssembler;

impl ConcatAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Arguments of the concat pass.
    pub fn build_args(&self) -> Vec<String> {
        FfmpegCommand::new(ASSEMBLED_OUTPUT)
            .input_args(["-f", "concat", "-safe", "0"])
            .input(CONCAT_LIST)
            .output_args(["-c", "copy", "-movflags", "+faststart"])
            .build_args()
    }

    /// Concatenate `clips` in the given order.
    ///
    /// All clips must share one stream layout (see the normalizer). The
    /// intermediate files are removed from the worker after reading.
    pub async fn concat<B: AsRef<[u8]>>(
        &self,
        worker: &mut dyn TranscodeWorker,
        clips: &[B],
        cancel: &CancelSignal,
    ) -> MediaResult<Vec<u8>> {
        if clips.is_empty() {
            return Err(MediaError::validation("nothing to concatenate"));
        }

        let names: Vec<String> = (0..clips.len()).map(clip_file_name).collect();
        for (name, clip) in names.iter().zip(clips) {
            worker.write_input(name, clip.as_ref()).await?;
        }
        worker
            .write_input(CONCAT_LIST, concat_list(&names).as_bytes())
            .await?;

        info!(clips = clips.len(), "Concatenating clips");
        worker
            .execute(&self.build_args(), cancel)
            .await?
            .check("concat")?;

        let assembled = worker.read_output(ASSEMBLED_OUTPUT).await?;

        for name in &names {
            worker.delete_file(name).await?;
        }
        worker.delete_file(CONCAT_LIST).await?;
        worker.delete_file(ASSEMBLED_OUTPUT).await?;

        debug!(bytes = assembled.len(), "Clips concatenated");
        Ok(assembled)
    }
}
