//! FFmpeg argument builder.
//!
//! Paths are file names relative to the worker's scratch directory, which is
//! the working directory FFmpeg runs in.

/// One `-i` input together with the options that precede it.
#[derive(Debug, Clone, PartialEq)]
struct FfmpegInput {
    args: Vec<String>,
    path: String,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in order (`0`, `1`, ...)
    inputs: Vec<FfmpegInput>,
    /// Options collected for the next input
    pending_input_args: Vec<String>,
    /// Output file, absent for probe-only runs
    output: Option<String>,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level, `None` keeps FFmpeg's default
    log_level: Option<String>,
    /// Whether to emit `-progress pipe:2`
    progress: bool,
}

impl FfmpegCommand {
    /// Create a transcode command writing to `output`.
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            inputs: Vec::new(),
            pending_input_args: Vec::new(),
            output: Some(output.into()),
            output_args: Vec::new(),
            overwrite: true,
            log_level: Some("error".to_string()),
            progress: true,
        }
    }

    /// Create a probe-only command (`-hide_banner -i input`).
    ///
    /// FFmpeg prints the stream summary and exits non-zero because no output
    /// is given.
    pub fn probe(input: impl Into<String>) -> Self {
        Self {
            inputs: Vec::new(),
            pending_input_args: Vec::new(),
            output: None,
            output_args: Vec::new(),
            overwrite: false,
            log_level: None,
            progress: false,
        }
        .input(input)
    }

    /// Add an option for the next input (before its -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.pending_input_args.push(arg.into());
        self
    }

    /// Add multiple options for the next input.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending_input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an input, consuming the pending input options.
    pub fn input(mut self, path: impl Into<String>) -> Self {
        let args = std::mem::take(&mut self.pending_input_args);
        self.inputs.push(FfmpegInput {
            args,
            path: path.into(),
        });
        self
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position for the next input.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit the duration read from the next input.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.output.is_none() {
            args.push("-hide_banner".to_string());
        }

        if self.overwrite {
            args.push("-y".to_string());
        }

        if let Some(level) = &self.log_level {
            args.push("-v".to_string());
            args.push(level.clone());
        }

        // Progress output to stderr
        if self.progress {
            args.push("-progress".to_string());
            args.push("pipe:2".to_string());
            args.push("-nostats".to_string());
        }

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.clone());
        }

        if let Some(output) = &self.output {
            args.extend(self.output_args.iter().cloned());
            args.push(output.clone());
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let args = FfmpegCommand::new("output.mp4")
            .seek(10.0)
            .duration(30.0)
            .input("input.mp4")
            .output_args(["-c:v", "libx264"])
            .build_args();

        assert_eq!(&args[..2], ["-y", "-v"]);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert_eq!(args[ss + 1], "10.000");
        assert!(args.contains(&"-progress".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_input_args_bind_to_next_input() {
        let args = FfmpegCommand::new("out.mp4")
            .input("base.mp4")
            .input_args(["-itsoffset", "9.500"])
            .input("ov0_%05d.png")
            .build_args();

        let joined = args.join(" ");
        assert!(joined.contains("-i base.mp4 -itsoffset 9.500 -i ov0_%05d.png out.mp4"));
    }

    #[test]
    fn test_probe_command() {
        let args = FfmpegCommand::probe("input.mov").build_args();
        assert_eq!(args, vec!["-hide_banner", "-i", "input.mov"]);
    }
}
