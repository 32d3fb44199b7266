use std::{
    io::prelude::*,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use serde::Serialize;
use serde_json::json;
use vpdq_lib::*;

use super::OutputFormat;

fn percent(fraction: f64) -> f64 {
    fraction * 100.0
}

fn segment_line(seg: &MatchedSegment) -> String {
    format!(
        "query {:.3}s-{:.3}s  target {:.3}s-{:.3}s  ({} frames, offset {:+.3}s)",
        seg.query_start_time,
        seg.query_end_time,
        seg.reference_start_time,
        seg.reference_end_time,
        seg.len,
        seg.time_offset()
    )
}

/// The result of comparing one query against one target.
#[derive(Debug, Clone)]
pub enum CompareOutput {
    Aligned(MatchResult),
    ByLine(LineMatch),
}

impl CompareOutput {
    pub fn write(&self, format: OutputFormat, verbose: bool, mut out: impl Write) -> std::io::Result<()> {
        match (self, format) {
            (Self::Aligned(res), OutputFormat::Normal) => {
                writeln!(out, "{:.2} Percentage Query Video match", percent(res.score))?;
                writeln!(out, "{:.2} Percentage Target Video match", percent(res.reference_score))?;
                for seg in &res.segments {
                    writeln!(out, "  {}", segment_line(seg))?;
                }
                if verbose {
                    for pair in &res.pairs {
                        writeln!(
                            out,
                            "    frame {} ({:.3}s) <-> frame {} ({:.3}s) distance {}",
                            pair.query.frame_number,
                            pair.query.timestamp,
                            pair.reference.frame_number,
                            pair.reference.timestamp,
                            pair.distance
                        )?;
                    }
                }
            }

            (Self::Aligned(res), OutputFormat::Json) => {
                let mut value = json!({
                    "score": res.score,
                    "reference_score": res.reference_score,
                    "eligible_query": res.eligible_query,
                    "eligible_reference": res.eligible_reference,
                    "segments": res.segments,
                });
                if verbose {
                    value["pairs"] = json!(res.pairs);
                }
                writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
            }

            (Self::ByLine(res), OutputFormat::Normal) => {
                writeln!(
                    out,
                    "{:.2} Percentage matched ({} of {} compared frames)",
                    percent(res.score()),
                    res.matched,
                    res.compared
                )?;
            }

            (Self::ByLine(res), OutputFormat::Json) => {
                let value = json!({
                    "score": res.score(),
                    "matched": res.matched,
                    "compared": res.compared,
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub path: PathBuf,
    pub result: MatchResult,
}

// One entry of the json search report.
#[derive(Serialize)]
struct SearchHitReport<'a> {
    path: &'a Path,
    score: f64,
    reference_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    segments: Option<&'a [MatchedSegment]>,
}

impl<'a> SearchHitReport<'a> {
    fn new(hit: &'a SearchHit, verbose: bool) -> Self {
        Self {
            path: &hit.path,
            score: hit.result.score,
            reference_score: hit.result.reference_score,
            segments: verbose.then_some(hit.result.segments.as_slice()),
        }
    }
}

/// Fingerprints that matched a query, best first.
#[derive(Debug, Clone, Default)]
pub struct SearchOutput {
    hits: Vec<SearchHit>,
}

impl SearchOutput {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn write(&self, format: OutputFormat, verbose: bool, mut out: impl Write) -> std::io::Result<()> {
        match format {
            OutputFormat::Normal => {
                for hit in &self.hits {
                    writeln!(
                        out,
                        "{:6.2}% {:6.2}%  {}",
                        percent(hit.result.score),
                        percent(hit.result.reference_score),
                        hit.path.display()
                    )?;
                    if verbose {
                        for seg in &hit.result.segments {
                            writeln!(out, "    {}", segment_line(seg))?;
                        }
                    }
                }
            }

            OutputFormat::Json => {
                let report = self
                    .hits
                    .iter()
                    .map(|hit| SearchHitReport::new(hit, verbose))
                    .collect_vec();
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use vpdq_lib::test_util::random_sequence;

    use super::*;

    fn self_match() -> MatchResult {
        let mut rng = StdRng::seed_from_u64(1);
        let seq = random_sequence(5, &mut rng);
        match_sequences(&seq, &seq, &MatchConfig::default())
    }

    fn render(output: &CompareOutput, format: OutputFormat, verbose: bool) -> String {
        let mut buf = vec![];
        output.write(format, verbose, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_compare_normal() {
        let text = render(&CompareOutput::Aligned(self_match()), OutputFormat::Normal, false);
        let lines = text.lines().collect_vec();
        assert_eq!(lines[0], "100.00 Percentage Query Video match");
        assert_eq!(lines[1], "100.00 Percentage Target Video match");
        assert_eq!(
            lines[2],
            "  query 0.000s-4.000s  target 0.000s-4.000s  (5 frames, offset +0.000s)"
        );
        assert_eq!(lines.len(), 3);

        let verbose = render(&CompareOutput::Aligned(self_match()), OutputFormat::Normal, true);
        assert_eq!(verbose.lines().count(), 8);
    }

    #[test]
    fn test_compare_json() {
        let text = render(&CompareOutput::Aligned(self_match()), OutputFormat::Json, false);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["score"], 1.0);
        assert_eq!(value["segments"].as_array().unwrap().len(), 1);
        assert!(value.get("pairs").is_none());

        let by_line = render(
            &CompareOutput::ByLine(LineMatch { compared: 4, matched: 1 }),
            OutputFormat::Json,
            false,
        );
        let value: serde_json::Value = serde_json::from_str(&by_line).unwrap();
        assert_eq!(value["score"], 0.25);
    }

    #[test]
    fn test_search_output() {
        let output = SearchOutput::new(vec![SearchHit {
            path: "corpus/a.vpdq".into(),
            result: self_match(),
        }]);
        assert_eq!(output.len(), 1);

        let mut buf = vec![];
        output.write(OutputFormat::Normal, false, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "100.00% 100.00%  corpus/a.vpdq\n");

        let mut buf = vec![];
        output.write(OutputFormat::Json, false, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["path"], "corpus/a.vpdq");
        assert_eq!(value[0]["score"], 1.0);
        assert_eq!(value[0]["reference_score"], 1.0);
        assert!(value[0].get("segments").is_none());

        let mut buf = vec![];
        output.write(OutputFormat::Json, true, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["segments"][0]["len"], 5);
        assert_eq!(value[0]["segments"][0]["query_start_frame"], 0);
    }
}
