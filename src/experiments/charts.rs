use crate::metrics::percentile;

use super::reporter::ExperimentResult;

/* ============================= GEOMETRY ============================= */

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 360.0;
const MARGIN: f64 = 48.0;

const BAR_FILL: &str = "#4e79a7";
const OK_FILL: &str = "#59a14f";
const FAIL_FILL: &str = "#e15759";
const AXIS_STROKE: &str = "#666666";

fn svg_open(title: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">
<text x="{x}" y="20" text-anchor="middle" font-size="15">{title}</text>
"#,
        x = WIDTH / 2.0,
    )
}

fn axes() -> String {
    format!(
        r#"<line x1="{m}" y1="{b}" x2="{r}" y2="{b}" stroke="{AXIS_STROKE}"/>
<line x1="{m}" y1="{t}" x2="{m}" y2="{b}" stroke="{AXIS_STROKE}"/>
"#,
        m = MARGIN,
        t = MARGIN,
        b = HEIGHT - MARGIN,
        r = WIDTH - MARGIN,
    )
}

fn plot_width() -> f64 {
    WIDTH - 2.0 * MARGIN
}

fn plot_height() -> f64 {
    HEIGHT - 2.0 * MARGIN
}

/* ============================= CHARTS ============================= */

/// Latency distribution histogram over fixed-width bins.
pub fn latency_histogram(latencies_ms: &[f64]) -> String {
    let mut svg = svg_open("Latency distribution (ms)");
    svg.push_str(&axes());

    if !latencies_ms.is_empty() {
        let min = latencies_ms.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = latencies_ms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let bins = 10usize;
        let span = (max - min).max(1e-9);
        let mut counts = vec![0usize; bins];
        for &v in latencies_ms {
            let idx = (((v - min) / span) * bins as f64) as usize;
            counts[idx.min(bins - 1)] += 1;
        }
        let peak = counts.iter().copied().max().unwrap_or(1).max(1) as f64;
        let bar_w = plot_width() / bins as f64;

        for (i, &count) in counts.iter().enumerate() {
            let h = plot_height() * count as f64 / peak;
            let x = MARGIN + i as f64 * bar_w;
            let y = HEIGHT - MARGIN - h;
            svg.push_str(&format!(
                r#"<rect x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}" fill="{BAR_FILL}"/>
"#,
                w = bar_w - 2.0,
            ));
            let label = min + (i as f64 + 0.5) * span / bins as f64;
            svg.push_str(&format!(
                r#"<text x="{cx:.1}" y="{ty:.1}" text-anchor="middle" font-size="9">{label:.0}</text>
"#,
                cx = x + bar_w / 2.0,
                ty = HEIGHT - MARGIN + 14.0,
            ));
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/// One bar per latency percentile.
pub fn percentile_bars(latencies_ms: &[f64]) -> String {
    let mut svg = svg_open("Latency percentiles (ms)");
    svg.push_str(&axes());

    if !latencies_ms.is_empty() {
        let mut sorted = latencies_ms.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite latencies"));
        let points = [
            ("p50", percentile(&sorted, 50)),
            ("p90", percentile(&sorted, 90)),
            ("p95", percentile(&sorted, 95)),
            ("p99", percentile(&sorted, 99)),
        ];
        let peak = points.iter().map(|(_, v)| *v).fold(1e-9_f64, f64::max);
        let slot = plot_width() / points.len() as f64;

        for (i, (label, value)) in points.iter().enumerate() {
            let h = plot_height() * value / peak;
            let x = MARGIN + i as f64 * slot + slot * 0.2;
            let y = HEIGHT - MARGIN - h;
            svg.push_str(&format!(
                r#"<rect x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}" fill="{BAR_FILL}"/>
<text x="{cx:.1}" y="{ly:.1}" text-anchor="middle">{label}</text>
<text x="{cx:.1}" y="{vy:.1}" text-anchor="middle" font-size="10">{value:.1}</text>
"#,
                w = slot * 0.6,
                cx = x + slot * 0.3,
                ly = HEIGHT - MARGIN + 16.0,
                vy = y - 4.0,
            ));
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/// Throughput over time as a polyline of (elapsed seconds, rate) samples.
pub fn throughput_timeline(samples: &[(f64, f64)]) -> String {
    let mut svg = svg_open("Throughput over time (violations/s)");
    svg.push_str(&axes());

    if samples.len() > 1 {
        let t_max = samples.iter().map(|(t, _)| *t).fold(1e-9_f64, f64::max);
        let r_max = samples.iter().map(|(_, r)| *r).fold(1e-9_f64, f64::max);
        let points: Vec<String> = samples
            .iter()
            .map(|(t, r)| {
                let x = MARGIN + plot_width() * t / t_max;
                let y = HEIGHT - MARGIN - plot_height() * r / r_max;
                format!("{x:.1},{y:.1}")
            })
            .collect();
        svg.push_str(&format!(
            r#"<polyline points="{}" fill="none" stroke="{BAR_FILL}" stroke-width="2"/>
"#,
            points.join(" ")
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

/// Success/failure donut. Angles are proportional to counts.
pub fn success_failure_pie(processed: u64, failed: u64) -> String {
    let mut svg = svg_open("Outcome split");
    let total = processed + failed;
    let cx = WIDTH / 2.0;
    let cy = HEIGHT / 2.0 + 10.0;
    let radius = 110.0;

    if total == 0 {
        svg.push_str(&format!(
            r##"<circle cx="{cx}" cy="{cy}" r="{radius}" fill="#dddddd"/>
"##
        ));
    } else if failed == 0 || processed == 0 {
        let fill = if failed == 0 { OK_FILL } else { FAIL_FILL };
        svg.push_str(&format!(
            r#"<circle cx="{cx}" cy="{cy}" r="{radius}" fill="{fill}"/>
"#
        ));
    } else {
        let fraction = processed as f64 / total as f64;
        let angle = fraction * std::f64::consts::TAU;
        let (sx, sy) = (cx, cy - radius);
        let ex = cx + radius * angle.sin();
        let ey = cy - radius * angle.cos();
        let large = i32::from(fraction > 0.5);
        svg.push_str(&format!(
            r#"<path d="M{cx},{cy} L{sx:.1},{sy:.1} A{radius},{radius} 0 {large} 1 {ex:.1},{ey:.1} Z" fill="{OK_FILL}"/>
<path d="M{cx},{cy} L{ex:.1},{ey:.1} A{radius},{radius} 0 {rev_large} 1 {sx:.1},{sy:.1} Z" fill="{FAIL_FILL}"/>
"#,
            rev_large = 1 - large,
        ));
    }

    svg.push_str(&format!(
        r#"<text x="{cx}" y="{ly}" text-anchor="middle">ok: {processed}  failed: {failed}</text>
"#,
        ly = HEIGHT - 12.0,
    ));
    svg.push_str("</svg>\n");
    svg
}

/// Throughput bars across experiments.
pub fn comparison_bars(results: &[ExperimentResult]) -> String {
    let mut svg = svg_open("Throughput by experiment (violations/s)");
    svg.push_str(&axes());

    if !results.is_empty() {
        let peak = results
            .iter()
            .map(ExperimentResult::throughput_per_second)
            .fold(1e-9_f64, f64::max);
        let slot = plot_width() / results.len() as f64;

        for (i, result) in results.iter().enumerate() {
            let value = result.throughput_per_second();
            let h = plot_height() * value / peak;
            let x = MARGIN + i as f64 * slot + slot * 0.15;
            let y = HEIGHT - MARGIN - h;
            svg.push_str(&format!(
                r#"<rect x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}" fill="{BAR_FILL}"/>
<text x="{cx:.1}" y="{ly:.1}" text-anchor="middle" font-size="10">{label}</text>
"#,
                w = slot * 0.7,
                cx = x + slot * 0.35,
                ly = HEIGHT - MARGIN + 16.0,
                label = result.experiment_type,
            ));
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/// Percentile-vs-time heatmap: rows are p50/p95/p99, columns are time
/// windows; cell shade scales with latency.
pub fn percentile_heatmap(windows: &[Vec<f64>]) -> String {
    let mut svg = svg_open("Latency percentiles over time (ms)");

    let rows = [("p50", 50usize), ("p95", 95), ("p99", 99)];
    let mut cells: Vec<Vec<f64>> = Vec::new();
    for (_, pct) in rows {
        let row: Vec<f64> = windows
            .iter()
            .map(|window| {
                let mut sorted = window.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite latencies"));
                percentile(&sorted, pct)
            })
            .collect();
        cells.push(row);
    }

    let peak = cells
        .iter()
        .flatten()
        .cloned()
        .fold(1e-9_f64, f64::max);

    if !windows.is_empty() {
        let cell_w = plot_width() / windows.len() as f64;
        let cell_h = plot_height() / rows.len() as f64;

        for (ri, row) in cells.iter().enumerate() {
            let y = MARGIN + ri as f64 * cell_h;
            svg.push_str(&format!(
                r#"<text x="{lx:.1}" y="{ly:.1}" text-anchor="end">{label}</text>
"#,
                lx = MARGIN - 6.0,
                ly = y + cell_h / 2.0,
                label = rows[ri].0,
            ));
            for (ci, &value) in row.iter().enumerate() {
                let intensity = (value / peak * 200.0) as u8;
                let x = MARGIN + ci as f64 * cell_w;
                svg.push_str(&format!(
                    r#"<rect x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}" fill="rgb({r},{g},230)"/>
"#,
                    w = cell_w - 1.0,
                    h = cell_h - 1.0,
                    r = 230 - intensity.min(200),
                    g = 230 - intensity.min(200),
                ));
            }
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/* ============================= HTML ROLLUP ============================= */

/// Single self-contained HTML page embedding every chart inline.
pub fn html_rollup(title: &str, charts: &[(String, String)]) -> String {
    let mut sections = String::new();
    for (heading, svg) in charts {
        sections.push_str(&format!(
            "<section>\n<h2>{heading}</h2>\n{svg}</section>\n"
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; max-width: 720px; margin: 2rem auto; color: #222; }}
section {{ margin-bottom: 2rem; }}
h2 {{ font-size: 1.1rem; border-bottom: 1px solid #ddd; padding-bottom: 0.3rem; }}
svg {{ width: 100%; height: auto; }}
</style>
</head>
<body>
<h1>{title}</h1>
{sections}</body>
</html>
"#
    )
}

/// All charts for one experiment result, ready for the rollup.
pub fn charts_for_result(result: &ExperimentResult) -> Vec<(String, String)> {
    let mut charts = vec![
        ("Latency distribution".to_string(), latency_histogram(&result.latencies_ms)),
        ("Latency percentiles".to_string(), percentile_bars(&result.latencies_ms)),
        (
            "Outcome split".to_string(),
            success_failure_pie(result.total_processed, result.total_failed),
        ),
    ];

    // Windowed views only make sense with enough samples
    if result.latencies_ms.len() >= 10 {
        let window = (result.latencies_ms.len() / 10).max(1);
        let windows: Vec<Vec<f64>> =
            result.latencies_ms.chunks(window).map(|c| c.to_vec()).collect();
        charts.push(("Percentiles over time".to_string(), percentile_heatmap(&windows)));

        let per_window_rate: Vec<(f64, f64)> = windows
            .iter()
            .enumerate()
            .map(|(i, w)| (i as f64, w.len() as f64))
            .collect();
        charts.push(("Throughput timeline".to_string(), throughput_timeline(&per_window_rate)));
    }

    charts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latencies() -> Vec<f64> {
        (0..100).map(|i| 50.0 + f64::from(i)).collect()
    }

    // ── histogram ──

    #[test]
    fn test_histogram_has_ten_bars() {
        let svg = latency_histogram(&latencies());
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<rect").count(), 10);
    }

    #[test]
    fn test_histogram_empty_input() {
        let svg = latency_histogram(&[]);
        assert!(svg.contains("<svg"));
        assert_eq!(svg.matches("<rect").count(), 0);
    }

    // ── percentile bars ──

    #[test]
    fn test_percentile_bars_four_bars() {
        let svg = percentile_bars(&latencies());
        assert_eq!(svg.matches("<rect").count(), 4);
        assert!(svg.contains("p99"));
    }

    // ── timeline ──

    #[test]
    fn test_timeline_polyline() {
        let samples: Vec<(f64, f64)> = (0..10).map(|i| (f64::from(i), 5.0)).collect();
        let svg = throughput_timeline(&samples);
        assert!(svg.contains("<polyline"));
    }

    #[test]
    fn test_timeline_single_point_no_line() {
        let svg = throughput_timeline(&[(0.0, 1.0)]);
        assert!(!svg.contains("<polyline"));
    }

    // ── pie ──

    #[test]
    fn test_pie_mixed_has_two_slices() {
        let svg = success_failure_pie(80, 20);
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains("ok: 80"));
    }

    #[test]
    fn test_pie_all_success_is_full_circle() {
        let svg = success_failure_pie(10, 0);
        assert!(svg.contains("<circle"));
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn test_pie_empty_grey() {
        let svg = success_failure_pie(0, 0);
        assert!(svg.contains("#dddddd"));
    }

    // ── comparison & heatmap ──

    #[test]
    fn test_comparison_one_bar_per_result() {
        let mut a = ExperimentResult::new("throughput", "steady", 60);
        a.record_processed(10.0);
        a.finish(10.0);
        let mut b = ExperimentResult::new("resilience", "burst", 60);
        b.record_processed(10.0);
        b.finish(10.0);
        let svg = comparison_bars(&[a, b]);
        assert_eq!(svg.matches("<rect").count(), 2);
    }

    #[test]
    fn test_heatmap_cells() {
        let windows = vec![latencies(), latencies(), latencies()];
        let svg = percentile_heatmap(&windows);
        // 3 percentile rows x 3 windows
        assert_eq!(svg.matches("<rect").count(), 9);
        assert!(svg.contains("p95"));
    }

    // ── rollup ──

    #[test]
    fn test_html_rollup_embeds_charts() {
        let charts = vec![
            ("Latency".to_string(), latency_histogram(&latencies())),
            ("Outcomes".to_string(), success_failure_pie(5, 1)),
        ];
        let html = html_rollup("Throughput run", &charts);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert_eq!(html.matches("<svg").count(), 2);
        assert!(html.contains("<h2>Latency</h2>"));
    }

    #[test]
    fn test_charts_for_result_complete() {
        let mut r = ExperimentResult::new("throughput", "steady", 60);
        for v in latencies() {
            r.record_processed(v);
        }
        r.finish(60.0);
        let charts = charts_for_result(&r);
        assert!(charts.len() >= 5);
    }
}
