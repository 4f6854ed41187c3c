//! In-memory drawing backend for rendering tests. Text is recorded instead of
//! rasterized, so no system fonts are needed.

use plotters_backend::{
    BackendColor, BackendCoord, BackendTextStyle, DrawingBackend, DrawingErrorKind,
};
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

#[derive(Debug, Default)]
pub(crate) struct Sketch {
    /// Pixels drawn in a visible, non-white color.
    pub inked: usize,
    pub texts: Vec<String>,
    pub presented: bool,
}

impl Sketch {
    pub fn has_text(&self, text: &str) -> bool {
        self.texts.iter().any(|t| t == text)
    }
}

pub(crate) struct Canvas {
    size: (u32, u32),
    sketch: Rc<RefCell<Sketch>>,
}

impl Canvas {
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            size,
            sketch: Rc::default(),
        }
    }

    /// Handle to what gets drawn, readable after the canvas is consumed.
    pub fn sketch(&self) -> Rc<RefCell<Sketch>> {
        Rc::clone(&self.sketch)
    }
}

impl DrawingBackend for Canvas {
    type ErrorType = Infallible;

    fn get_size(&self) -> (u32, u32) {
        self.size
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Infallible>> {
        Ok(())
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Infallible>> {
        self.sketch.borrow_mut().presented = true;
        Ok(())
    }

    fn draw_pixel(
        &mut self,
        _point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Infallible>> {
        if color.alpha > 0.0 && color.rgb != (255, 255, 255) {
            self.sketch.borrow_mut().inked += 1;
        }
        Ok(())
    }

    fn draw_text<S: BackendTextStyle>(
        &mut self,
        text: &str,
        _style: &S,
        _pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Infallible>> {
        self.sketch.borrow_mut().texts.push(text.to_string());
        Ok(())
    }

    fn estimate_text_size<S: BackendTextStyle>(
        &self,
        text: &str,
        style: &S,
    ) -> Result<(u32, u32), DrawingErrorKind<Infallible>> {
        let h = style.size().max(1.0) as u32;
        Ok((text.chars().count() as u32 * h / 2, h))
    }
}
