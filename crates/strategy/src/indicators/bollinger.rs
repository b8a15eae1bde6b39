/// Bollinger Bands: SMA(period) ± std_mult × population standard deviation.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub period: usize,
    pub std_mult: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPoint {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_mult: f64) -> Self {
        assert!(period > 0, "Bollinger period must be positive");
        Self { period, std_mult }
    }

    pub fn series(&self, closes: &[f64]) -> Vec<Option<BandPoint>> {
        let mut out = vec![None; closes.len()];
        if closes.len() < self.period {
            return out;
        }
        let n = self.period as f64;
        for end in self.period..=closes.len() {
            let window = &closes[end - self.period..end];
            let mean = window.iter().sum::<f64>() / n;
            let var = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
            let width = self.std_mult * var.sqrt();
            out[end - 1] = Some(BandPoint {
                upper: mean + width,
                middle: mean,
                lower: mean - width,
            });
        }
        out
    }
}
