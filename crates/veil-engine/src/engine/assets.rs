use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::error::{EngineError, EngineResult};

/// Decoded straight-alpha RGBA8 bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// A `width`×`height` bitmap filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Decodes an image file into a [`Bitmap`].
pub fn decode_bitmap(path: &Path) -> EngineResult<Bitmap> {
    let img = image::open(path).map_err(|source| EngineError::AssetLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Bitmap {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

/// The two bitmaps the pipeline needs before it can start.
#[derive(Debug, Clone)]
pub struct LoadedAssets {
    pub background: Bitmap,
    pub mask: Bitmap,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Slot {
    Background,
    Mask,
}

/// Join point for the asynchronous bitmap loads.
///
/// Loads complete in any order; the barrier opens once both slots are
/// filled. The first failed load is reported and the barrier stays closed.
pub struct AssetBarrier {
    rx: Option<Receiver<(Slot, EngineResult<Bitmap>)>>,
    background: Option<Bitmap>,
    mask: Option<Bitmap>,
}

impl AssetBarrier {
    /// Decodes both files on worker threads.
    pub fn spawn(background: PathBuf, mask: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel();

        for (slot, path) in [(Slot::Background, background), (Slot::Mask, mask)] {
            let tx = tx.clone();
            thread::spawn(move || {
                log::debug!("loading {slot:?} bitmap from {}", path.display());
                tx.send((slot, decode_bitmap(&path))).ok();
            });
        }

        Self {
            rx: Some(rx),
            background: None,
            mask: None,
        }
    }

    /// A barrier that is already open.
    pub fn ready(assets: LoadedAssets) -> Self {
        Self {
            rx: None,
            background: Some(assets.background),
            mask: Some(assets.mask),
        }
    }

    /// Number of filled slots.
    pub fn loaded(&self) -> usize {
        usize::from(self.background.is_some()) + usize::from(self.mask.is_some())
    }

    pub fn is_open(&self) -> bool {
        self.loaded() == 2
    }

    fn accept(&mut self, slot: Slot, result: EngineResult<Bitmap>) -> EngineResult<()> {
        let bitmap = result?;
        log::info!(
            "{slot:?} bitmap loaded ({}x{}), {}/2",
            bitmap.width,
            bitmap.height,
            self.loaded() + 1
        );
        match slot {
            Slot::Background => self.background = Some(bitmap),
            Slot::Mask => self.mask = Some(bitmap),
        }
        Ok(())
    }

    /// Collects finished loads without blocking.
    ///
    /// Returns `Ok(true)` once both bitmaps are in.
    pub fn poll(&mut self) -> EngineResult<bool> {
        while !self.is_open() {
            let Some(rx) = &self.rx else {
                return Err(EngineError::AssetLoaderDisconnected);
            };
            match rx.try_recv() {
                Ok((slot, result)) => self.accept(slot, result)?,
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Disconnected) => return Err(EngineError::AssetLoaderDisconnected),
            }
        }
        self.rx = None;
        Ok(true)
    }

    /// Blocks until both bitmaps are in.
    pub fn wait(&mut self) -> EngineResult<()> {
        while !self.is_open() {
            let Some(rx) = &self.rx else {
                return Err(EngineError::AssetLoaderDisconnected);
            };
            let (slot, result) = rx.recv().map_err(|_| EngineError::AssetLoaderDisconnected)?;
            self.accept(slot, result)?;
        }
        self.rx = None;
        Ok(())
    }

    /// Hands out the bitmaps once the barrier is open.
    pub fn take(&mut self) -> Option<LoadedAssets> {
        if !self.is_open() {
            return None;
        }
        Some(LoadedAssets {
            background: self.background.take()?,
            mask: self.mask.take()?,
        })
    }
}
