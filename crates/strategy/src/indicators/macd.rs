use super::ema;

/// MACD line, its signal line and the histogram between them.
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    /// `EMA(fast) - EMA(slow)`.
    pub line: Vec<Option<f64>>,
    /// EMA of the defined part of `line`.
    pub signal: Vec<Option<f64>>,
    /// `line - signal`.
    pub histogram: Vec<Option<f64>>,
}

/// MACD of `series` (oldest first). All three outputs have the input's length.
///
/// `line` is defined from index `slow - 1`; `signal` and `histogram` from
/// `slow + signal - 2`.
pub fn macd(series: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(series, fast);
    let slow_ema = ema(series, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let first = line.iter().position(Option::is_some).unwrap_or(line.len());
    let defined: Vec<f64> = line[first..].iter().flatten().copied().collect();
    let mut signal_line = vec![None; first];
    signal_line.extend(ema(&defined, signal));

    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    Macd { line, signal: signal_line, histogram }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_definition_offsets() {
        let series: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let out = macd(&series, 12, 26, 9);
        assert_eq!(out.line.len(), 60);
        assert_eq!(out.histogram.len(), 60);
        assert!(out.line[24].is_none() && out.line[25].is_some());
        assert!(out.signal[32].is_none() && out.signal[33].is_some());
        assert!(out.histogram[32].is_none() && out.histogram[33].is_some());
    }

    #[test]
    fn macd_line_is_fast_minus_slow() {
        let series: Vec<f64> = (0..40).map(|i| 50.0 + i as f64).collect();
        let out = macd(&series, 3, 6, 4);
        let (fast, slow) = (ema(&series, 3), ema(&series, 6));
        let i = 39;
        assert!((out.line[i].unwrap() - (fast[i].unwrap() - slow[i].unwrap())).abs() < 1e-12);
        let hist = out.line[i].unwrap() - out.signal[i].unwrap();
        assert!((out.histogram[i].unwrap() - hist).abs() < 1e-12);
    }

    #[test]
    fn macd_is_positive_in_steady_uptrend() {
        let series: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * 0.5).collect();
        let out = macd(&series, 12, 26, 9);
        // (slow lag - fast lag) * slope = (12.5 - 5.5) * 0.5
        assert!((out.line[79].unwrap() - 3.5).abs() < 0.05);
        assert!(out.histogram[79].unwrap().abs() < 0.05);
    }

    #[test]
    fn macd_short_series_is_undefined() {
        let out = macd(&[1.0, 2.0, 3.0], 12, 26, 9);
        assert!(out.line.iter().all(Option::is_none));
        assert!(out.histogram.iter().all(Option::is_none));
    }
}
