// Human-readable and JSON rendering of reports

use super::{ComprehensiveImpactReport, FieldAnalysis, RecommendedAction, ReportStatus};
use crate::error::{ImpactError, Result};

impl ComprehensiveImpactReport {
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ImpactError::Computation(format!("failed to serialize report: {}", e)))
    }

    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        match self.status {
            ReportStatus::Complete => report.push_str("✅ IMPACT REPORT COMPLETE\n\n"),
            ReportStatus::Partial => report.push_str("⚠️  IMPACT REPORT PARTIAL\n\n"),
            _ => report.push_str("❌ IMPACT REPORT FAILED\n\n"),
        }
        report.push_str(&format!(
            "Event: {} at {}\n",
            self.event.event_id,
            self.event.timestamp.to_rfc3339()
        ));
        report.push_str(&format!("Analysis: {}\n", self.analysis_id));
        report.push_str(&format!(
            "Window: {} days before, {} days after\n",
            self.options.window.before_days, self.options.window.after_days
        ));

        let marker = match self.recommendation.action {
            RecommendedAction::Act => "🚀",
            RecommendedAction::Monitor => "👀",
            RecommendedAction::CollectMoreData => "⏳",
            RecommendedAction::NoAction => "💤",
        };
        report.push_str(&format!(
            "\n{} Recommendation ({}): {}\n",
            marker, self.recommendation.action, self.recommendation.headline
        ));
        for detail in &self.recommendation.details {
            report.push_str(&format!("  - {}\n", detail));
        }

        if !self.fields.is_empty() {
            report.push_str("\n📊 Fields:\n");
            for field in &self.fields {
                render_field(&mut report, field);
            }
        }

        if let Some(correction) = &self.correction {
            report.push_str(&format!(
                "\nCorrection: {} at α={} ({} of {} rejected, per-test threshold {:.4})\n",
                correction.method,
                correction.alpha,
                correction.rejected_count,
                correction.p_values.len(),
                correction.corrected_alpha
            ));
        }

        if let Some(cross) = &self.cross_field {
            report.push_str("\n🔗 Cross-field:\n");
            if let Some(matrix) = &cross.correlations {
                for pair in matrix.changed_pairs() {
                    if let Some(change) = pair.change {
                        report.push_str(&format!(
                            "  {} ~ {}: correlation {}\n",
                            pair.field_a,
                            pair.field_b,
                            change.as_str()
                        ));
                    }
                }
            }
            if let Some(network) = &cross.network {
                report.push_str(&format!(
                    "  Dependency network: {} edges, {} cycles\n",
                    network.edge_count(),
                    network.cycles.len()
                ));
                for edge in &network.edges {
                    report.push_str(&format!(
                        "    {} -> {} (lag {}, p={:.4})\n",
                        edge.from, edge.to, edge.lag, edge.p_value
                    ));
                }
            }
            if let Some(composite) = &cross.composite {
                report.push_str(&format!(
                    "  Composite impact ({}): {:.3}\n",
                    composite.method, composite.value
                ));
            }
        }

        if !self.warnings.is_empty() {
            report.push_str(&format!("\n⚠️  Warnings ({}):\n", self.warnings.len()));
            for warning in &self.warnings {
                report.push_str(&format!("  - {}\n", warning));
            }
        }

        report
    }
}

fn render_field(report: &mut String, field: &FieldAnalysis) {
    let test = &field.test;
    let flag = if field.significant_after_correction {
        "❗"
    } else {
        "•"
    };
    report.push_str(&format!(
        "  {} {} [{}] {} (mean {:.3} -> {:.3}, p={:.4}",
        flag,
        field.field,
        test.kind,
        test.direction.as_str(),
        test.mean_before,
        test.mean_after,
        test.p_value
    ));
    if let Some(adjusted) = field.adjusted_p_value {
        report.push_str(&format!(", adjusted p={:.4}", adjusted));
    }
    report.push_str(")\n");

    if let Some(effects) = &field.effect_sizes {
        report.push_str(&format!(
            "      Cohen's d = {:.3} ({}), Hedges' g = {:.3}\n",
            effects.cohens_d.value,
            effects.cohens_d.magnitude.as_str(),
            effects.hedges_g.value
        ));
    }
    if let Some(power) = &field.power {
        report.push_str(&format!("      Achieved power: {:.2}\n", power.power));
    }
    if let Some(temporal) = &field.temporal {
        report.push_str(&format!(
            "      Decay-weighted impact: {:.3}",
            temporal.weighted_impact
        ));
        if let Some(half_life) = temporal.persistence().and_then(|p| p.half_life_days) {
            report.push_str(&format!(", half-life {:.1} days", half_life));
        }
        report.push('\n');
    }
    for warning in field.warnings.iter().chain(&test.warnings) {
        report.push_str(&format!("      ⚠️  {}\n", warning));
    }
}
