use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::Path;
use tracing::warn;
use vislab_core::{ContrastThresholds, Finding, Rule, Status};

const LUMA_WEIGHTS: [f64; 3] = [0.2126, 0.7152, 0.0722];
const INK_QUANTILE: f64 = 0.05;
const BORDER_PX: usize = 10;
const BORDER_MIN_SIDE: usize = 40;

pub fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn relative_luminance(rgb: [u8; 3]) -> f64 {
    rgb.iter()
        .zip(LUMA_WEIGHTS)
        .map(|(&channel, weight)| weight * srgb_to_linear(f64::from(channel) / 255.0))
        .sum()
}

pub fn contrast_ratio_between(a: f64, b: f64) -> f64 {
    let (lighter, darker) = if a >= b { (a, b) } else { (b, a) };
    (lighter + 0.05) / (darker + 0.05)
}

#[derive(Debug, Clone)]
pub struct LuminanceMap {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl LuminanceMap {
    pub fn from_rgb(img: &RgbImage) -> Self {
        let values = img.pixels().map(|p| relative_luminance(p.0)).collect();
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            values,
        }
    }

    pub fn from_values(width: usize, height: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != width * height {
            return Err(anyhow!(
                "luminance buffer has {} values for {}x{}",
                values.len(),
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.width + col]
    }

    // Top and bottom bands span full rows, left and right bands span full
    // columns, so corner pixels are sampled twice.
    pub fn border_samples(&self) -> Vec<f64> {
        let b = border_thickness(self.height, self.width);
        let mut out = Vec::with_capacity(2 * b * (self.width + self.height));
        for row in (0..b).chain(self.height - b..self.height) {
            for col in 0..self.width {
                out.push(self.at(row, col));
            }
        }
        for cols in [0..b, self.width - b..self.width] {
            for row in 0..self.height {
                for col in cols.clone() {
                    out.push(self.at(row, col));
                }
            }
        }
        out
    }
}

pub fn border_thickness(height: usize, width: usize) -> usize {
    let side = height.min(width);
    if side >= BORDER_MIN_SIDE {
        BORDER_PX
    } else {
        (side / 8).max(1)
    }
}

// Linear interpolation between closest ranks, q in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastEstimate {
    pub background: f64,
    pub foreground: f64,
    pub ratio: f64,
}

pub fn estimate_contrast(map: &LuminanceMap) -> Result<ContrastEstimate> {
    if map.width == 0 || map.height == 0 {
        return Err(anyhow!("empty image"));
    }
    let background =
        quantile(&map.border_samples(), 0.5).ok_or_else(|| anyhow!("empty border"))?;
    let foreground = quantile(&map.values, INK_QUANTILE).ok_or_else(|| anyhow!("empty image"))?;
    Ok(ContrastEstimate {
        background,
        foreground,
        ratio: contrast_ratio_between(background, foreground),
    })
}

pub fn estimate_image_contrast(path: &Path) -> Result<ContrastEstimate> {
    let img = image::open(path)?.to_rgb8();
    estimate_contrast(&LuminanceMap::from_rgb(&img))
}

pub fn classify_ratio(ratio: f64, thresholds: &ContrastThresholds) -> Status {
    if ratio >= thresholds.pass_ratio {
        Status::Pass
    } else if ratio >= thresholds.warn_ratio {
        Status::Warn
    } else {
        Status::Fail
    }
}

pub fn contrast_finding(path: &Path, thresholds: &ContrastThresholds) -> Finding {
    match estimate_image_contrast(path) {
        Ok(estimate) => {
            let mut finding =
                Finding::new(Rule::ContrastText, classify_ratio(estimate.ratio, thresholds));
            finding.ratio = Some((estimate.ratio * 100.0).round() / 100.0);
            finding.threshold_text = Some(thresholds.pass_ratio);
            finding.threshold_graphics = Some(thresholds.warn_ratio);
            finding
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "contrast estimate failed");
            Finding::new(Rule::ContrastText, Status::Error)
                .with_detail(format!("contrast calc failed: {}", e))
        }
    }
}
