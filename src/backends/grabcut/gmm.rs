//! Full-covariance Gaussian mixture colour model

#![allow(clippy::indexing_slicing)]

/// Number of mixture components per model
pub const COMPONENTS: usize = 5;

const KMEANS_ITERATIONS: usize = 10;
const SINGULAR_EPSILON: f64 = f64::EPSILON;
const REGULARIZATION: f64 = 0.01;

pub type Color = [f64; 3];

#[derive(Debug, Clone, Default)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    /// `1 / sqrt(det)`, the Gaussian's normalization up to a constant factor
    norm: f64,
}

impl Component {
    fn density(&self, color: &Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];
        let mut mahalanobis = 0.0;
        for (i, row) in self.inverse.iter().enumerate() {
            mahalanobis += d[i] * (row[0] * d[0] + row[1] * d[1] + row[2] * d[2]);
        }
        self.norm * (-0.5 * mahalanobis).exp()
    }
}

/// Running sums used to estimate one component
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: usize,
    sum: Color,
    prod: [[f64; 3]; 3],
}

impl Accumulator {
    fn add(&mut self, c: &Color) {
        self.count += 1;
        for i in 0..3 {
            self.sum[i] += c[i];
            for j in 0..3 {
                self.prod[i][j] += c[i] * c[j];
            }
        }
    }

    fn finish(&self, total: usize) -> Component {
        if self.count == 0 || total == 0 {
            return Component::default();
        }
        let n = self.count as f64;
        let mean = [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n];
        let mut cov = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                cov[i][j] = self.prod[i][j] / n - mean[i] * mean[j];
            }
        }
        let mut det = determinant(&cov);
        if det <= SINGULAR_EPSILON {
            for (i, row) in cov.iter_mut().enumerate() {
                row[i] += REGULARIZATION;
            }
            det = determinant(&cov);
        }
        Component {
            weight: n / total as f64,
            mean,
            inverse: invert(&cov, det),
            norm: 1.0 / det.sqrt(),
        }
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn invert(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn squared_distance(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn luma(c: &Color) -> f64 {
    0.299 * c[0] + 0.587 * c[1] + 0.114 * c[2]
}

/// Gaussian mixture over RGB colours
#[derive(Debug, Clone, Default)]
pub struct Gmm {
    components: [Component; COMPONENTS],
}

impl Gmm {
    /// Initial component assignment by k-means
    ///
    /// Centres are seeded at luma quantiles so the result depends only on the
    /// sample colours, then refined with a fixed number of Lloyd iterations.
    #[must_use]
    pub fn kmeans_labels(samples: &[Color]) -> Vec<usize> {
        if samples.is_empty() {
            return Vec::new();
        }

        let mut order: Vec<usize> = (0..samples.len()).collect();
        order.sort_by(|&a, &b| luma(&samples[a]).total_cmp(&luma(&samples[b])));
        let mut centers: Vec<Color> = (0..COMPONENTS)
            .map(|k| {
                let q = ((2 * k + 1) * samples.len()) / (2 * COMPONENTS);
                let idx = order.get(q.min(samples.len() - 1)).copied().unwrap_or(0);
                samples[idx]
            })
            .collect();

        let mut labels = vec![0usize; samples.len()];
        for _ in 0..KMEANS_ITERATIONS {
            for (label, sample) in labels.iter_mut().zip(samples) {
                *label = nearest(&centers, sample);
            }

            let mut sums = [[0.0f64; 3]; COMPONENTS];
            let mut counts = [0usize; COMPONENTS];
            for (&label, sample) in labels.iter().zip(samples) {
                counts[label] += 1;
                for c in 0..3 {
                    sums[label][c] += sample[c];
                }
            }
            for (k, center) in centers.iter_mut().enumerate() {
                // Empty clusters keep their previous centre.
                if counts[k] > 0 {
                    let n = counts[k] as f64;
                    *center = [sums[k][0] / n, sums[k][1] / n, sums[k][2] / n];
                }
            }
        }
        labels
    }

    /// Estimate all components from samples and their component labels
    #[must_use]
    pub fn learn(samples: &[Color], labels: &[usize]) -> Self {
        let mut acc = [Accumulator::default(); COMPONENTS];
        for (sample, &label) in samples.iter().zip(labels) {
            if let Some(slot) = acc.get_mut(label) {
                slot.add(sample);
            }
        }
        let total = samples.len();
        Self {
            components: std::array::from_fn(|k| acc[k].finish(total)),
        }
    }

    /// Most likely component for a colour
    #[must_use]
    pub fn most_likely_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_p = f64::NEG_INFINITY;
        for (k, comp) in self.components.iter().enumerate() {
            let p = comp.weight * comp.density(color);
            if p > best_p {
                best_p = p;
                best = k;
            }
        }
        best
    }

    /// Mixture likelihood of a colour
    #[must_use]
    pub fn probability(&self, color: &Color) -> f64 {
        self.components
            .iter()
            .map(|comp| comp.weight * comp.density(color))
            .sum()
    }
}

fn nearest(centers: &[Color], sample: &Color) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (k, center) in centers.iter().enumerate() {
        let d = squared_distance(center, sample);
        if d < best_d {
            best_d = d;
            best = k;
        }
    }
    best
}
