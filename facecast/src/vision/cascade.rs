//! Haar cascade classifiers stored in OpenCV's `opencv-cascade-classifier`
//! XML layout, evaluated with a sliding window over an image pyramid.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::info;
use quick_xml::Reader;
use quick_xml::events::Event;

use super::prepare::LumaImage;
use super::{Detection, Detector, Region};
use crate::error::{CascadeError, SetupError};

/// Multi-scale search knobs, mirroring `detectMultiScale`'s defaults.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchParams {
    /// Window growth per pyramid level. Values at or below 1 fall back to
    /// the default.
    pub scale_factor: f32,
    /// Hits a group needs beyond this count to survive. 0 returns every
    /// raw hit.
    pub min_neighbors: usize,
    /// Smallest window searched, in source pixels.
    pub min_size: [u32; 2],
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: [0, 0],
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct WeightedRect {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    weight: f32,
}

#[derive(Clone, Debug)]
struct Feature {
    rects: Vec<WeightedRect>,
}

#[derive(Clone, Copy, Debug)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f32,
}

#[derive(Clone, Debug)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f32>,
}

#[derive(Clone, Debug)]
struct Stage {
    threshold: f32,
    classifiers: Vec<WeakClassifier>,
}

/// A boosted Haar cascade. Only upright features are supported.
#[derive(Clone, Debug)]
pub struct Cascade {
    window: [u32; 2],
    stages: Vec<Stage>,
    features: Vec<Feature>,
}

impl Cascade {
    pub fn load(path: &Path) -> Result<Self, SetupError> {
        let text = fs::read_to_string(path).map_err(|err| {
            SetupError::new(format!(
                "cannot open cascade '{}': {}",
                path.display(),
                err
            ))
        })?;
        let cascade = Self::from_xml(&text).map_err(|err| {
            SetupError::new(format!(
                "cannot load cascade '{}': {}",
                path.display(),
                err
            ))
        })?;

        info!(
            "Loaded cascade {} ({} stages, {}x{} window)",
            path.display(),
            cascade.stages.len(),
            cascade.window[0],
            cascade.window[1]
        );
        Ok(cascade)
    }

    pub fn from_xml(text: &str) -> Result<Self, CascadeError> {
        let document = parse_xml(text)?;
        let storage = document.child("opencv_storage")?;
        let Some(cascade) =
            storage.children.iter().find(|child| child.name == "cascade")
        else {
            return Err(match storage.children.first() {
                Some(other) => CascadeError::Unsupported(format!(
                    "<{}> uses the pre-2.4 layout",
                    other.name
                )),
                None => CascadeError::Missing("cascade".to_string()),
            });
        };

        let stage_type: String = cascade.value("stageType")?;
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!(
                "{} stages",
                stage_type
            )));
        }
        let feature_type: String = cascade.value("featureType")?;
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!(
                "{} features",
                feature_type
            )));
        }

        let window: [u32; 2] =
            [cascade.value("width")?, cascade.value("height")?];
        if window[0] < 3 || window[1] < 3 {
            return Err(invalid(
                "width",
                format!("window {}x{} is too small", window[0], window[1]),
            ));
        }

        let features = cascade
            .items("features")?
            .into_iter()
            .map(|element| parse_feature(element, window))
            .collect::<Result<Vec<_>, _>>()?;
        let stages = cascade
            .items("stages")?
            .into_iter()
            .map(|element| parse_stage(element, features.len()))
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err(invalid("stages", "no stages".to_string()));
        }

        Ok(Self {
            window,
            stages,
            features,
        })
    }

    /// Detection window size the cascade was trained at.
    pub fn window(&self) -> [u32; 2] {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Every window the cascade accepts, grouped per `params`, in source
    /// image coordinates.
    pub fn detect(
        &self,
        image: &LumaImage,
        params: &SearchParams,
    ) -> Vec<Region> {
        let scale_factor = if params.scale_factor > 1.0 {
            params.scale_factor
        } else {
            SearchParams::default().scale_factor
        };

        let mut hits = Vec::new();
        let mut factor = 1.0f32;
        loop {
            let window = [
                (self.window[0] as f32 * factor).round() as u32,
                (self.window[1] as f32 * factor).round() as u32,
            ];
            if window[0] > image.width() || window[1] > image.height() {
                break;
            }

            let big_enough = window[0] >= params.min_size[0]
                && window[1] >= params.min_size[1];
            if big_enough {
                let size = [
                    (image.width() as f32 / factor).round() as u32,
                    (image.height() as f32 / factor).round() as u32,
                ];
                let (Some(max_x), Some(max_y)) = (
                    size[0].checked_sub(self.window[0]),
                    size[1].checked_sub(self.window[1]),
                ) else {
                    break;
                };

                let resized;
                let level = if size == [image.width(), image.height()] {
                    image
                } else {
                    resized = image.resize(size[0], size[1]);
                    &resized
                };

                let integral = Integral::new(level);
                let step = if factor > 2.0 { 1 } else { 2 };
                for y in (0..=max_y as usize).step_by(step) {
                    for x in (0..=max_x as usize).step_by(step) {
                        if self.accepts(&integral, x, y) {
                            hits.push(Region::new(
                                (x as f32 * factor).round() as u32,
                                (y as f32 * factor).round() as u32,
                                window[0],
                                window[1],
                            ));
                        }
                    }
                }
            }

            factor *= scale_factor;
        }

        group_regions(hits, params.min_neighbors, GROUP_EPS)
    }

    fn accepts(&self, integral: &Integral, x: usize, y: usize) -> bool {
        let width = self.window[0] as usize;
        let height = self.window[1] as usize;
        let inner = [x + 1, y + 1, width - 2, height - 2];
        let area = (inner[2] * inner[3]) as f64;
        let sum = integral.sum(&integral.sums, inner);
        let squares = integral.sum(&integral.squares, inner);
        let spread = area * squares - sum * sum;
        let norm = if spread > 0.0 { 1.0 / spread.sqrt() } else { 1.0 };

        self.stages.iter().all(|stage| {
            let score: f32 = stage
                .classifiers
                .iter()
                .map(|weak| {
                    weak.score(|feature| {
                        self.features[feature].value(integral, x, y) * norm
                    })
                })
                .sum();
            score >= stage.threshold
        })
    }
}

impl Feature {
    fn value(&self, integral: &Integral, x: usize, y: usize) -> f64 {
        self.rects
            .iter()
            .map(|rect| {
                let area = [x + rect.x, y + rect.y, rect.width, rect.height];
                rect.weight as f64 * integral.sum(&integral.sums, area)
            })
            .sum()
    }
}

impl WeakClassifier {
    fn score(&self, mut feature_value: impl FnMut(usize) -> f64) -> f32 {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            let next = if feature_value(node.feature) < node.threshold as f64 {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return self.leaves[next.unsigned_abs() as usize];
            }
            index = next as usize;
        }
    }
}

/// Summed-area tables over values and squared values.
struct Integral {
    stride: usize,
    sums: Vec<f64>,
    squares: Vec<f64>,
}

impl Integral {
    fn new(image: &LumaImage) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        let mut squares = vec![0.0; stride * (height + 1)];

        for (y, row) in image.data().chunks_exact(width.max(1)).enumerate() {
            let mut row_sum = 0.0;
            let mut row_squares = 0.0;
            for (x, &value) in row.iter().enumerate() {
                let value = value as f64;
                row_sum += value;
                row_squares += value * value;
                let at = (y + 1) * stride + x + 1;
                sums[at] = sums[at - stride] + row_sum;
                squares[at] = squares[at - stride] + row_squares;
            }
        }

        Self {
            stride,
            sums,
            squares,
        }
    }

    /// Sum over `[x, y, width, height]`.
    fn sum(&self, table: &[f64], [x, y, width, height]: [usize; 4]) -> f64 {
        let top = y * self.stride;
        let bottom = (y + height) * self.stride;
        table[bottom + x + width] - table[top + x + width] - table[bottom + x]
            + table[top + x]
    }
}

const GROUP_EPS: f32 = 0.2;

/// Merges overlapping hits the way `groupRectangles` does. Each cluster of
/// similar rects becomes its average and needs more than `min_neighbors`
/// hits to survive; a cluster inside a stronger one is suppressed.
pub fn group_regions(
    regions: Vec<Region>,
    min_neighbors: usize,
    eps: f32,
) -> Vec<Region> {
    if min_neighbors == 0 || regions.is_empty() {
        return regions;
    }

    let count = regions.len();
    let mut parent = (0..count).collect::<Vec<_>>();
    for i in 0..count {
        for j in i + 1..count {
            if similar(&regions[i], &regions[j], eps) {
                let a = find_root(&mut parent, i);
                let b = find_root(&mut parent, j);
                if a != b {
                    parent[a] = b;
                }
            }
        }
    }

    let mut class_of = vec![None; count];
    let mut groups: Vec<([f64; 4], usize)> = Vec::new();
    for (i, region) in regions.iter().enumerate() {
        let root = find_root(&mut parent, i);
        let class = *class_of[root].get_or_insert_with(|| {
            groups.push(([0.0; 4], 0));
            groups.len() - 1
        });
        let (sums, hits) = &mut groups[class];
        sums[0] += region.x as f64;
        sums[1] += region.y as f64;
        sums[2] += region.width as f64;
        sums[3] += region.height as f64;
        *hits += 1;
    }

    let averaged = groups
        .iter()
        .map(|(sums, hits)| {
            let n = *hits as f64;
            let avg = |i: usize| (sums[i] / n).round() as u32;
            (Region::new(avg(0), avg(1), avg(2), avg(3)), *hits)
        })
        .collect::<Vec<_>>();

    averaged
        .iter()
        .enumerate()
        .filter(|&(i, &(region, hits))| {
            if hits <= min_neighbors {
                return false;
            }
            !averaged.iter().enumerate().any(|(j, &(outer, outer_hits))| {
                j != i
                    && outer_hits > min_neighbors
                    && encloses(&outer, &region, eps)
                    && (outer_hits > hits.max(3) || hits < 3)
            })
        })
        .map(|(_, &(region, _))| region)
        .collect()
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn similar(a: &Region, b: &Region, eps: f32) -> bool {
    let delta = eps as f64
        * (a.width.min(b.width) as f64 + a.height.min(b.height) as f64)
        * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;

    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn encloses(outer: &Region, inner: &Region, eps: f32) -> bool {
    let dx = (outer.width as f32 * eps).round() as i64;
    let dy = (outer.height as f32 * eps).round() as i64;
    let [ox, oy, ow, oh] = [outer.x, outer.y, outer.width, outer.height]
        .map(i64::from);
    let [ix, iy, iw, ih] = [inner.x, inner.y, inner.width, inner.height]
        .map(i64::from);

    ix >= ox - dx
        && iy >= oy - dy
        && ix + iw <= ox + ow + dx
        && iy + ih <= oy + oh + dy
}

/// Face cascade over the whole frame, then eye cascade inside the largest
/// face.
#[derive(Clone, Debug)]
pub struct CascadeDetector {
    face: Cascade,
    eyes: Cascade,
    params: SearchParams,
}

impl CascadeDetector {
    pub fn new(face: Cascade, eyes: Cascade) -> Self {
        Self {
            face,
            eyes,
            params: SearchParams::default(),
        }
    }

    pub fn load(face: &Path, eyes: &Path) -> Result<Self, SetupError> {
        Ok(Self::new(Cascade::load(face)?, Cascade::load(eyes)?))
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }
}

impl Detector for CascadeDetector {
    fn detect(&mut self, image: &LumaImage) -> Detection {
        let Some(face) = self
            .face
            .detect(image, &self.params)
            .into_iter()
            .max_by_key(|face| face.width as u64 * face.height as u64)
        else {
            return Detection::default();
        };

        let mut eyes = self.eyes.detect(&image.crop(&face), &self.params);
        eyes.sort_by_key(|eye| eye.x);
        eyes.truncate(2);
        for eye in &mut eyes {
            eye.x += face.x;
            eye.y += face.y;
        }

        Detection {
            face: Some(face),
            eyes,
        }
    }
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Result<&Element, CascadeError> {
        self.children
            .iter()
            .find(|child| child.name == name)
            .ok_or_else(|| CascadeError::Missing(name.to_string()))
    }

    /// The `<_>` entries of a list element.
    fn items(&self, name: &str) -> Result<Vec<&Element>, CascadeError> {
        Ok(self
            .child(name)?
            .children
            .iter()
            .filter(|child| child.name == "_")
            .collect())
    }

    fn value<T: FromStr>(&self, name: &str) -> Result<T, CascadeError> {
        let text = self.child(name)?.text.trim();
        text.parse()
            .map_err(|_| invalid(name, format!("cannot parse '{}'", text)))
    }

    fn numbers(&self) -> Result<Vec<f32>, CascadeError> {
        self.text
            .split_whitespace()
            .map(|token| {
                token.parse::<f32>().map_err(|_| {
                    invalid(&self.name, format!("'{}' is not a number", token))
                })
            })
            .collect()
    }
}

fn invalid(element: &str, reason: String) -> CascadeError {
    CascadeError::Invalid {
        element: element.to_string(),
        reason,
    }
}

fn xml_error(err: impl std::fmt::Display) -> CascadeError {
    CascadeError::Xml(err.to_string())
}

fn element_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn parse_xml(text: &str) -> Result<Element, CascadeError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element::default()];
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(Element {
                name: element_name(start.name().as_ref()),
                ..Element::default()
            }),
            Event::Empty(start) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Element {
                        name: element_name(start.name().as_ref()),
                        ..Element::default()
                    });
                }
            }
            Event::Text(content) => {
                let content = content.unescape().map_err(xml_error)?;
                if let Some(current) = stack.last_mut() {
                    if !current.text.is_empty() {
                        current.text.push(' ');
                    }
                    current.text.push_str(&content);
                }
            }
            Event::End(_) => {
                let closed = stack.pop();
                match (closed, stack.last_mut()) {
                    (Some(closed), Some(parent)) => {
                        parent.children.push(closed)
                    }
                    _ => return Err(xml_error("unbalanced closing tag")),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(document), true) => Ok(document),
        _ => Err(xml_error("unclosed element")),
    }
}

fn parse_feature(
    element: &Element,
    window: [u32; 2],
) -> Result<Feature, CascadeError> {
    let tilted = element
        .children
        .iter()
        .any(|child| child.name == "tilted" && child.text.trim() != "0");
    if tilted {
        return Err(CascadeError::Unsupported("tilted features".to_string()));
    }

    let rects = element
        .items("rects")?
        .into_iter()
        .map(|rect| {
            let values = rect.numbers()?;
            let [x, y, width, height, weight] = values[..] else {
                return Err(invalid(
                    "rects",
                    format!("expected 5 values, got {}", values.len()),
                ));
            };
            let inside = x >= 0.0
                && y >= 0.0
                && width > 0.0
                && height > 0.0
                && x + width <= window[0] as f32
                && y + height <= window[1] as f32;
            if !inside {
                return Err(invalid(
                    "rects",
                    format!(
                        "{} {} {} {} lies outside the {}x{} window",
                        x, y, width, height, window[0], window[1]
                    ),
                ));
            }
            Ok(WeightedRect {
                x: x as usize,
                y: y as usize,
                width: width as usize,
                height: height as usize,
                weight,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() || rects.len() > 3 {
        return Err(invalid(
            "rects",
            format!("expected 1 to 3 rects, got {}", rects.len()),
        ));
    }
    Ok(Feature { rects })
}

fn parse_stage(
    element: &Element,
    feature_count: usize,
) -> Result<Stage, CascadeError> {
    let threshold = element.value("stageThreshold")?;
    let classifiers = element
        .items("weakClassifiers")?
        .into_iter()
        .map(|weak| parse_weak_classifier(weak, feature_count))
        .collect::<Result<Vec<_>, _>>()?;
    if classifiers.is_empty() {
        return Err(invalid("weakClassifiers", "stage is empty".to_string()));
    }

    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(
    element: &Element,
    feature_count: usize,
) -> Result<WeakClassifier, CascadeError> {
    let raw = element.child("internalNodes")?.numbers()?;
    let leaves = element.child("leafValues")?.numbers()?;
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(invalid(
            "internalNodes",
            format!("expected groups of 4 values, got {}", raw.len()),
        ));
    }

    let mut nodes = Vec::with_capacity(raw.len() / 4);
    for (index, values) in raw.chunks_exact(4).enumerate() {
        let feature = values[2];
        if feature < 0.0 || feature as usize >= feature_count {
            return Err(invalid(
                "internalNodes",
                format!("feature {} out of range", feature),
            ));
        }

        let node = TreeNode {
            left: values[0] as i32,
            right: values[1] as i32,
            feature: feature as usize,
            threshold: values[3],
        };
        // Branches only point forward, so evaluation always terminates.
        for next in [node.left, node.right] {
            let valid = if next > 0 {
                (next as usize) > index && (next as usize) < raw.len() / 4
            } else {
                (next.unsigned_abs() as usize) < leaves.len()
            };
            if !valid {
                return Err(invalid(
                    "internalNodes",
                    format!("branch {} of node {} out of range", next, index),
                ));
            }
        }
        nodes.push(node);
    }

    Ok(WeakClassifier { nodes, leaves })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One stump: accepts a 6x6 window whose bottom half is brighter than
    /// its top half.
    const BRIGHT_BELOW: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>6</height>
  <width>6</width>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 1.</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 6 6 -1.</_>
        <_>
          0 3 6 3 2.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    fn image(width: u32, height: u32, bright: [u32; 4]) -> LumaImage {
        let [x0, y0, x1, y1] = bright;
        let data = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| {
                    if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                        255
                    } else {
                        0
                    }
                })
            })
            .collect();
        LumaImage::new(width, height, data).expect("luma")
    }

    fn raw() -> SearchParams {
        SearchParams {
            min_neighbors: 0,
            ..SearchParams::default()
        }
    }

    #[test]
    fn parses_stages_and_window() {
        let cascade = Cascade::from_xml(BRIGHT_BELOW).expect("cascade");
        assert_eq!(cascade.window(), [6, 6]);
        assert_eq!(cascade.stage_count(), 1);
    }

    #[test]
    fn finds_the_trained_pattern() {
        let cascade = Cascade::from_xml(BRIGHT_BELOW).expect("cascade");
        let frame = image(24, 24, [10, 13, 16, 16]);

        let hits = cascade.detect(&frame, &raw());
        assert!(hits.contains(&Region::new(10, 10, 6, 6)), "{:?}", hits);
    }

    #[test]
    fn flat_images_have_no_hits() {
        let cascade = Cascade::from_xml(BRIGHT_BELOW).expect("cascade");
        let flat = LumaImage::new(32, 24, vec![128; 32 * 24]).expect("luma");
        let tiny = LumaImage::new(4, 4, vec![0; 16]).expect("luma");

        assert!(cascade.detect(&flat, &raw()).is_empty());
        assert!(cascade.detect(&tiny, &raw()).is_empty());
    }

    #[test]
    fn detector_reports_nothing_without_a_face() {
        let cascade = Cascade::from_xml(BRIGHT_BELOW).expect("cascade");
        let mut detector = CascadeDetector::new(cascade.clone(), cascade);
        let flat = LumaImage::new(32, 24, vec![40; 32 * 24]).expect("luma");

        assert_eq!(detector.detect(&flat), Detection::default());
    }

    #[test]
    fn eyes_are_reported_in_frame_coordinates() {
        let cascade = Cascade::from_xml(BRIGHT_BELOW).expect("cascade");
        let mut detector =
            CascadeDetector::new(cascade.clone(), cascade).with_params(raw());
        let frame = image(24, 24, [10, 13, 16, 16]);

        let detection = detector.detect(&frame);
        let face = detection.face.expect("face");
        assert!(detection.eyes.len() <= 2);
        for eye in &detection.eyes {
            assert!(eye.x >= face.x && eye.y >= face.y);
            assert!(eye.x < face.x + face.width);
            assert!(eye.y < face.y + face.height);
        }
    }

    #[test]
    fn grouping_averages_clusters_and_drops_strays() {
        let hits = vec![
            Region::new(10, 10, 20, 20),
            Region::new(11, 10, 20, 20),
            Region::new(10, 11, 20, 20),
            Region::new(12, 12, 20, 20),
            Region::new(100, 100, 20, 20),
        ];

        assert_eq!(
            group_regions(hits.clone(), 3, 0.2),
            vec![Region::new(11, 11, 20, 20)]
        );
        assert_eq!(group_regions(hits.clone(), 0, 0.2), hits);
        assert!(group_regions(hits, 4, 0.2).is_empty());
    }

    #[test]
    fn grouping_suppresses_weaker_clusters_inside_stronger_ones() {
        let mut hits = vec![Region::new(0, 0, 40, 40); 5];
        hits.extend(vec![Region::new(10, 10, 16, 16); 4]);

        assert_eq!(
            group_regions(hits, 3, 0.2),
            vec![Region::new(0, 0, 40, 40)]
        );
    }

    #[test]
    fn malformed_cascades_are_rejected() {
        let tilted = BRIGHT_BELOW.replace(
            "0 3 6 3 2.</_></rects>",
            "0 3 6 3 2.</_></rects><tilted>1</tilted>",
        );
        assert_eq!(
            Cascade::from_xml(&tilted).map(|_| ()),
            Err(CascadeError::Unsupported("tilted features".to_string()))
        );

        let bad_feature = BRIGHT_BELOW.replace("0 -1 0 1.", "0 -1 7 1.");
        assert!(matches!(
            Cascade::from_xml(&bad_feature),
            Err(CascadeError::Invalid { .. })
        ));

        let outside = BRIGHT_BELOW.replace("0 3 6 3 2.", "0 3 6 4 2.");
        assert!(matches!(
            Cascade::from_xml(&outside),
            Err(CascadeError::Invalid { .. })
        ));

        let lbp = BRIGHT_BELOW.replace(">HAAR<", ">LBP<");
        assert!(matches!(
            Cascade::from_xml(&lbp),
            Err(CascadeError::Unsupported(_))
        ));

        let legacy = "<opencv_storage><haarcascade_frontalface \
                      type_id=\"opencv-haar-classifier\"/></opencv_storage>";
        assert!(matches!(
            Cascade::from_xml(legacy),
            Err(CascadeError::Unsupported(_))
        ));

        assert!(matches!(
            Cascade::from_xml("<opencv_storage><cascade>"),
            Err(CascadeError::Xml(_))
        ));
    }

    #[test]
    fn missing_file_is_a_setup_error_naming_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("haarcascade_missing.xml");

        let err = Cascade::load(&path).expect_err("missing");
        assert!(err.to_string().contains("haarcascade_missing.xml"));

        let broken = dir.path().join("broken.xml");
        fs::write(&broken, "not xml at all <").expect("write");
        let err = Cascade::load(&broken).expect_err("broken");
        assert!(err.to_string().contains("broken.xml"));
    }
}
