use std::{
    ffi::OsString,
    io::{self, Read},
    path::PathBuf,
    process::{Child, ChildStdout, Command, Stdio},
};

use songbird::input::{Input, RawAdapter};
use symphonia::core::io::ReadOnlySource;

use crate::{
    error::PlayError,
    sound::{CHANNELS, SAMPLE_RATE},
};

/// An ffmpeg invocation turning any input file into raw PCM on stdout.
#[derive(Debug, Clone)]
pub struct Transcode {
    program: OsString,
    input: PathBuf,
}

impl Transcode {
    pub fn new(program: impl Into<OsString>, input: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            input: input.into(),
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-threads", "1", "-loglevel", "error", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(self.input.clone().into_os_string());
        args.extend(
            [
                "-f".to_string(),
                "f32le".to_string(),
                "-ar".to_string(),
                SAMPLE_RATE.to_string(),
                "-ac".to_string(),
                CHANNELS.to_string(),
                "-".to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args
    }

    pub fn spawn(&self) -> Result<FfmpegStream, PlayError> {
        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(PlayError::Ffmpeg)?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PlayError::Ffmpeg(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "ffmpeg stdout was not captured",
                )));
            }
        };

        log::debug!("spawned {:?} for `{}`", self.program, self.input.display());
        Ok(FfmpegStream { child, stdout })
    }
}

/// Stdout of a running ffmpeg process. The process is killed when this is
/// dropped.
#[derive(Debug)]
pub struct FfmpegStream {
    child: Child,
    stdout: ChildStdout,
}

impl FfmpegStream {
    pub fn into_input(self) -> Input {
        RawAdapter::new(ReadOnlySource::new(self), SAMPLE_RATE, CHANNELS).into()
    }
}

impl Read for FfmpegStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                log::warn!("ffmpeg exited with {}", status);
            }
            Ok(Some(_)) => {}
            _ => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_raw_pcm_args() {
        let args = Transcode::new("ffmpeg", "266566__gowlermusic__gong-hit.wav").args();
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();

        assert_eq!(
            args,
            [
                "-hide_banner",
                "-threads",
                "1",
                "-loglevel",
                "error",
                "-i",
                "266566__gowlermusic__gong-hit.wav",
                "-f",
                "f32le",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-",
            ]
        );
    }

    #[test]
    fn missing_program() {
        let err = Transcode::new("gong-no-such-transcoder", "in.wav")
            .spawn()
            .unwrap_err();
        assert!(matches!(err, PlayError::Ffmpeg(e) if e.kind() == io::ErrorKind::NotFound));
    }

    #[cfg(unix)]
    #[test]
    fn streams_child_stdout() {
        // `echo` ignores the ffmpeg flags and prints them back.
        let mut stream = Transcode::new("echo", "in.wav").spawn().unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();

        assert!(out.starts_with("-hide_banner"));
        assert!(out.trim_end().ends_with('-'));
    }
}
