#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathSegment {
    MoveTo(Point),
    CubicTo { ctrl1: Point, ctrl2: Point, to: Point },
    LineTo(Point),
    Close,
}

/// One filled path on a `width` x `height` surface, y growing downwards.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCommand {
    pub width: f32,
    pub height: f32,
    pub segments: Vec<PathSegment>,
}

impl DrawCommand {
    pub fn empty(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            segments: Vec::new(),
        }
    }

    /// Flat path along the bottom edge, for frames with nothing to plot.
    pub fn baseline(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            segments: vec![
                PathSegment::MoveTo(Point::new(0.0, height)),
                PathSegment::LineTo(Point::new(width, height)),
                PathSegment::Close,
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Points the curve passes through, left to right.
    pub fn control_points(&self) -> Vec<Point> {
        self.segments
            .iter()
            .map_while(|segment| match *segment {
                PathSegment::MoveTo(p) => Some(p),
                PathSegment::CubicTo { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    /// Flattens the curve (everything before the drop to the baseline) into a
    /// polyline with `steps` points per cubic segment.
    pub fn outline(&self, steps: usize) -> Vec<Point> {
        let steps = steps.max(1);
        let mut points = Vec::new();
        let mut current = None;

        for segment in &self.segments {
            match *segment {
                PathSegment::MoveTo(p) => {
                    points.push(p);
                    current = Some(p);
                }
                PathSegment::CubicTo { ctrl1, ctrl2, to } => {
                    let from = current.unwrap_or(ctrl1);
                    for k in 1..=steps {
                        let t = k as f32 / steps as f32;
                        points.push(cubic_point(from, ctrl1, ctrl2, to, t));
                    }
                    current = Some(to);
                }
                PathSegment::LineTo(_) | PathSegment::Close => break,
            }
        }

        points
    }
}

fn cubic_point(p0: Point, p1: Point, p2: Point, p3: Point, t: f32) -> Point {
    let u = 1.0 - t;
    let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
    Point::new(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveStyle {
    /// Every `stride`-th bin becomes a control point.
    pub stride: usize,
    /// Surface units per unit of magnitude.
    pub scale: f32,
}

impl Default for CurveStyle {
    fn default() -> Self {
        Self {
            stride: 4,
            scale: 2.0,
        }
    }
}

/// Picks every `stride`-th bin, without averaging: `len / stride` values.
pub fn decimate(bins: &[f32], stride: usize) -> Vec<f32> {
    let stride = stride.max(1);
    bins.iter()
        .step_by(stride)
        .take(bins.len() / stride)
        .copied()
        .collect()
}

/// Builds the filled spectrum curve for one frame.
///
/// Control points are spread evenly over the width with larger magnitudes
/// drawn higher. Consecutive points are joined by cubic segments whose
/// handles sit a third of the way along the segment, following the centered
/// slope at each point (edge points reuse themselves as the missing neighbor).
/// The path then drops to the baseline and returns to the left edge.
///
/// Frames of fewer than 2 bins draw nothing. Frames the stride leaves with
/// fewer than 2 control values draw a flat baseline.
pub fn render_curve(bins: &[f32], width: f32, height: f32, style: &CurveStyle) -> DrawCommand {
    if bins.len() < 2 {
        return DrawCommand::empty(width, height);
    }
    let values = decimate(bins, style.stride);
    if values.len() < 2 {
        return DrawCommand::baseline(width, height);
    }

    let last = values.len() - 1;
    let dx = width / last as f32;
    let ys: Vec<f32> = values.iter().map(|v| height - v * style.scale).collect();

    let point = |m: usize| Point::new(m as f32 * dx, ys[m]);
    let slope = |m: usize| (ys[(m + 1).min(last)] - ys[m.saturating_sub(1)]) / 2.0;

    let mut segments = Vec::with_capacity(last + 4);
    segments.push(PathSegment::MoveTo(point(0)));

    for m in 0..last {
        let from = point(m);
        let to = point(m + 1);
        segments.push(PathSegment::CubicTo {
            ctrl1: Point::new(from.x + dx / 3.0, from.y + slope(m) / 3.0),
            ctrl2: Point::new(to.x - dx / 3.0, to.y - slope(m + 1) / 3.0),
            to,
        });
    }

    segments.push(PathSegment::LineTo(Point::new(width, height)));
    segments.push(PathSegment::LineTo(Point::new(0.0, height)));
    segments.push(PathSegment::Close);

    DrawCommand {
        width,
        height,
        segments,
    }
}
