//! Asynchronous diagnostic writer with worker thread pool.
//!
//! Lost-spot frames and spot projections are written from worker threads so
//! the control loop never waits on the filesystem. The queue is bounded; when
//! it is full the write is dropped and the caller is told so.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum DiagnosticPayload {
    Frame(Array2<u16>),
    Profile(Vec<u64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Two bytes per sample, most significant byte first, rows concatenated
    RawBigEndian,
    /// One line per row, comma separated
    Csv,
}

pub struct FrameWriterHandle {
    sender: Option<Sender<WriteTask>>,
    workers: Vec<JoinHandle<()>>,
}

struct WriteTask {
    payload: DiagnosticPayload,
    filepath: PathBuf,
    format: FrameFormat,
}

impl FrameWriterHandle {
    pub fn new(num_workers: usize, buffer_size: usize) -> Result<Self> {
        let (sender, receiver) = bounded::<WriteTask>(buffer_size);

        let mut workers = Vec::new();
        for worker_id in 0..num_workers.max(1) {
            let receiver = receiver.clone();

            let handle = std::thread::Builder::new()
                .name(format!("frame-writer-{worker_id}"))
                .spawn(move || {
                    debug!("Frame writer worker {} started", worker_id);
                    while let Ok(task) = receiver.recv() {
                        if let Err(e) = save_payload(&task.payload, &task.filepath, task.format)
                        {
                            warn!(
                                "Worker {} failed to save {}: {:#}",
                                worker_id,
                                task.filepath.display(),
                                e
                            );
                        }
                    }
                    debug!("Frame writer worker {} shutting down", worker_id);
                })
                .context("Failed to spawn frame writer worker")?;

            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Drain the queue and join every worker
    pub fn wait_for_completion(mut self) {
        self.shutdown();
        info!("All frame writer workers completed");
    }

    fn shutdown(&mut self) {
        mem::drop(self.sender.take());

        for (worker_id, handle) in self.workers.drain(..).enumerate() {
            if let Err(e) = handle.join() {
                warn!("Worker {} panicked: {:?}", worker_id, e);
            }
        }
    }

    /// Queue a frame for writing; fails immediately if the queue is full
    pub fn write_frame(
        &self,
        frame_data: &Array2<u16>,
        filepath: PathBuf,
        format: FrameFormat,
    ) -> Result<()> {
        self.send_task(WriteTask {
            payload: DiagnosticPayload::Frame(frame_data.clone()),
            filepath,
            format,
        })
    }

    /// Queue a 1D projection, written as one value per line
    pub fn write_profile(&self, profile: &[u64], filepath: PathBuf) -> Result<()> {
        self.send_task(WriteTask {
            payload: DiagnosticPayload::Profile(profile.to_vec()),
            filepath,
            format: FrameFormat::Csv,
        })
    }

    fn send_task(&self, task: WriteTask) -> Result<()> {
        let Some(sender) = &self.sender else {
            anyhow::bail!("Frame writer workers have shut down");
        };
        let path = task.filepath.clone();
        match sender.try_send(task) {
            Ok(_) => Ok(()),
            Err(TrySendError::Full(_)) => {
                anyhow::bail!("Frame writer queue full, dropping {}", path.display())
            }
            Err(TrySendError::Disconnected(_)) => {
                anyhow::bail!("Frame writer workers have shut down")
            }
        }
    }
}

impl Drop for FrameWriterHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn save_payload(payload: &DiagnosticPayload, filepath: &Path, format: FrameFormat) -> Result<()> {
    if let Some(parent) = filepath.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let file = File::create(filepath)
        .with_context(|| format!("Failed to create {}", filepath.display()))?;
    let mut out = BufWriter::new(file);

    match (payload, format) {
        (DiagnosticPayload::Frame(frame), FrameFormat::RawBigEndian) => {
            for &pixel in frame.iter() {
                out.write_all(&pixel.to_be_bytes())?;
            }
        }
        (DiagnosticPayload::Frame(frame), FrameFormat::Csv) => {
            for row in frame.rows() {
                let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                writeln!(out, "{}", line.join(","))?;
            }
        }
        (DiagnosticPayload::Profile(profile), _) => {
            for value in profile {
                writeln!(out, "{value}")?;
            }
        }
    }

    out.flush()
        .with_context(|| format!("Failed to flush {}", filepath.display()))?;
    Ok(())
}
