/// Pixel rectangle, origin at the window's top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(size: [u32; 2]) -> Self {
        Self::new(0.0, 0.0, size[0] as f32, size[1] as f32)
    }

    pub fn aspect(&self) -> f32 {
        if self.height <= 0.0 {
            return 1.0;
        }
        self.width / self.height
    }

    pub fn center(&self) -> [f32; 2] {
        [self.x + self.width / 2.0, self.y + self.height / 2.0]
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Intersection with `bounds`. Disjoint rects collapse to zero size at
    /// the nearest edge; non-finite rects collapse to `bounds`' origin.
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        if !bounds.is_finite() || bounds.width < 0.0 || bounds.height < 0.0 {
            return Rect::default();
        }
        let far = [self.x + self.width, self.y + self.height];
        if !self.is_finite() || !far.iter().all(|v| v.is_finite()) {
            return Rect::new(bounds.x, bounds.y, 0.0, 0.0);
        }

        let x0 = self.x.clamp(bounds.x, bounds.x + bounds.width);
        let y0 = self.y.clamp(bounds.y, bounds.y + bounds.height);
        let x1 = far[0].clamp(x0, bounds.x + bounds.width);
        let y1 = far[1].clamp(y0, bounds.y + bounds.height);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// How a node sizes itself inside its parent's rect. Resolved again on
/// every traversal so window resizes need no bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Layout {
    #[default]
    Fill,
    /// Offset and size relative to the parent's origin.
    Fixed(Rect),
    /// Full parent width, fixed height, anchored to the top.
    FillWidth { height: f32 },
    /// Fractions of the parent size, centred.
    Fraction { width: f32, height: f32 },
    /// Largest centred rect with the given width/height ratio.
    Aspect { ratio: f32 },
}

impl Layout {
    pub fn resolve(&self, parent: &Rect) -> Rect {
        let rect = match *self {
            Layout::Fill => *parent,
            Layout::Fixed(rect) => Rect::new(
                parent.x + rect.x,
                parent.y + rect.y,
                rect.width,
                rect.height,
            ),
            Layout::FillWidth { height } => {
                Rect::new(parent.x, parent.y, parent.width, height)
            }
            Layout::Fraction { width, height } => {
                let w = parent.width * width.clamp(0.0, 1.0);
                let h = parent.height * height.clamp(0.0, 1.0);
                centered(parent, w, h)
            }
            Layout::Aspect { ratio } => {
                if ratio <= 0.0 || !ratio.is_finite() {
                    *parent
                } else if parent.aspect() > ratio {
                    let w = parent.height * ratio;
                    centered(parent, w, parent.height)
                } else {
                    let h = parent.width / ratio;
                    centered(parent, parent.width, h)
                }
            }
        };

        rect.clamp_to(parent)
    }
}

fn centered(parent: &Rect, width: f32, height: f32) -> Rect {
    Rect::new(
        parent.x + (parent.width - width) / 2.0,
        parent.y + (parent.height - height) / 2.0,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Rect = Rect::new(0.0, 0.0, 800.0, 600.0);

    #[test]
    fn fill_takes_parent_rect() {
        assert_eq!(Layout::Fill.resolve(&WINDOW), WINDOW);
    }

    #[test]
    fn fixed_is_offset_from_parent_and_clamped() {
        let parent = Rect::new(100.0, 50.0, 200.0, 100.0);
        let layout = Layout::Fixed(Rect::new(150.0, 10.0, 100.0, 40.0));

        assert_eq!(layout.resolve(&parent), Rect::new(250.0, 60.0, 50.0, 40.0));
    }

    #[test]
    fn fill_width_anchors_to_top() {
        let layout = Layout::FillWidth { height: 32.0 };
        assert_eq!(layout.resolve(&WINDOW), Rect::new(0.0, 0.0, 800.0, 32.0));
    }

    #[test]
    fn fraction_is_centred() {
        let layout = Layout::Fraction {
            width: 0.5,
            height: 0.25,
        };
        assert_eq!(
            layout.resolve(&WINDOW),
            Rect::new(200.0, 225.0, 400.0, 150.0)
        );
    }

    #[test]
    fn aspect_letterboxes_and_pillarboxes() {
        let layout = Layout::Aspect { ratio: 2.0 };

        let wide = Rect::new(0.0, 0.0, 1600.0, 600.0);
        assert_eq!(layout.resolve(&wide), Rect::new(200.0, 0.0, 1200.0, 600.0));

        let tall = Rect::new(0.0, 0.0, 600.0, 1200.0);
        assert_eq!(layout.resolve(&tall), Rect::new(0.0, 450.0, 600.0, 300.0));
    }

    #[test]
    fn non_finite_layouts_collapse_instead_of_panicking() {
        let fraction = Layout::Fraction {
            width: f32::NAN,
            height: 0.5,
        };
        assert_eq!(fraction.resolve(&WINDOW), Rect::new(0.0, 0.0, 0.0, 0.0));

        let parent = Rect::new(10.0, 20.0, 100.0, 100.0);
        let fixed = Layout::Fixed(Rect::new(0.0, f32::NAN, 10.0, 10.0));
        assert_eq!(fixed.resolve(&parent), Rect::new(10.0, 20.0, 0.0, 0.0));

        let endless = Layout::Fixed(Rect::new(
            f32::NEG_INFINITY,
            0.0,
            f32::INFINITY,
            10.0,
        ));
        assert_eq!(endless.resolve(&parent), Rect::new(10.0, 20.0, 0.0, 0.0));

        let height = Layout::FillWidth {
            height: f32::INFINITY,
        };
        assert_eq!(height.resolve(&parent), Rect::new(10.0, 20.0, 0.0, 0.0));

        assert_eq!(
            Layout::Fill.resolve(&Rect::new(f32::NAN, 0.0, 1.0, 1.0)),
            Rect::default()
        );
    }

    #[test]
    fn invalid_aspect_falls_back_to_fill() {
        let layout = Layout::Aspect { ratio: 0.0 };
        assert_eq!(layout.resolve(&WINDOW), WINDOW);
    }
}
