// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use kinema_core::sink::{FrameImage, FrameSink, PresentationTime, SinkError};
use std::path::{Path, PathBuf};

/// Writes each frame as a numbered PNG file: `<prefix>_00000.png`, `<prefix>_00001.png`, ...
///
/// Encoding happens inside `append`, so the sink is always ready for more data.
#[derive(Debug)]
pub struct PngSequenceSink {
    directory: PathBuf,
    prefix: String,
    written: Vec<PathBuf>,
    finished: bool,
}

impl PngSequenceSink {
    /// Creates the output directory if needed.
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, SinkError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| {
            SinkError::Rejected(format!("cannot create {}: {e}", directory.display()))
        })?;
        Ok(Self {
            directory,
            prefix: prefix.into(),
            written: Vec::new(),
            finished: false,
        })
    }

    /// The directory frames are written to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Paths of the files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FrameSink for PngSequenceSink {
    fn is_ready_for_more_data(&self) -> bool {
        !self.finished
    }

    fn append(&mut self, image: FrameImage, time: PresentationTime) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Closed);
        }
        let path = self
            .directory
            .join(format!("{}_{:05}.png", self.prefix, self.written.len()));
        let extent = image.extent();
        image::save_buffer(
            &path,
            image.pixels(),
            extent.width,
            extent.height,
            image::ColorType::Rgba8,
        )
        .map_err(|e| SinkError::AppendFailed(format!("{}: {e}", path.display())))?;
        log::debug!("PngSequenceSink: wrote {} ({time})", path.display());
        self.written.push(path);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        log::info!(
            "PngSequenceSink finished: {} frames in {}",
            self.written.len(),
            self.directory.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_core::math::Extent2D;

    #[test]
    fn writes_numbered_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::new(dir.path().join("out"), "frame").unwrap();

        let pixels: Vec<u8> = (0..16).collect();
        for i in 0..2 {
            let image = FrameImage::new(Extent2D::new(2, 2), pixels.clone()).unwrap();
            sink.append(image, PresentationTime::new(i, 30)).unwrap();
        }
        sink.finish().unwrap();

        assert_eq!(sink.written().len(), 2);
        assert!(sink.written()[1].ends_with("frame_00001.png"));
        let decoded = image::open(&sink.written()[0]).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.into_raw(), pixels);
    }

    #[test]
    fn append_after_finish_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::new(dir.path(), "f").unwrap();
        sink.finish().unwrap();
        let image = FrameImage::new(Extent2D::new(1, 1), vec![0; 4]).unwrap();
        assert_eq!(
            sink.append(image, PresentationTime::new(0, 1)),
            Err(SinkError::Closed)
        );
    }
}
