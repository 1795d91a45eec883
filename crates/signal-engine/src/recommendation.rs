use signal_core::{
    Decision, ForecastResult, Recommendation, SentimentClass, SentimentResult, SignalConfig, Trend,
};

/// How strongly the two inputs agree. Selects the base confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conviction {
    Aligned,
    Conflicting,
    Weak,
}

const TRENDS: [Trend; 3] = [Trend::Up, Trend::Down, Trend::Flat];
const SENTIMENTS: [SentimentClass; 3] = [
    SentimentClass::Positive,
    SentimentClass::Negative,
    SentimentClass::Neutral,
];

/// Trend (rows: UP, DOWN, FLAT) × sentiment (columns: POSITIVE, NEGATIVE, NEUTRAL).
pub const DECISION_TABLE: [[(Decision, Conviction); 3]; 3] = [
    [
        (Decision::Buy, Conviction::Aligned),
        (Decision::Hold, Conviction::Conflicting),
        (Decision::Hold, Conviction::Weak),
    ],
    [
        (Decision::Hold, Conviction::Conflicting),
        (Decision::Sell, Conviction::Aligned),
        (Decision::Hold, Conviction::Weak),
    ],
    [
        (Decision::Hold, Conviction::Weak),
        (Decision::Hold, Conviction::Weak),
        (Decision::Hold, Conviction::Weak),
    ],
];

pub fn lookup(trend: Trend, sentiment: SentimentClass) -> (Decision, Conviction) {
    let row = TRENDS.iter().position(|t| *t == trend).unwrap_or(2);
    let col = SENTIMENTS.iter().position(|s| *s == sentiment).unwrap_or(2);
    DECISION_TABLE[row][col]
}

fn confidence_label(confidence: f64) -> &'static str {
    if confidence > 0.7 {
        "High"
    } else if confidence > 0.4 {
        "Medium"
    } else {
        "Low"
    }
}

const HEADLINE_EXCERPT_CHARS: usize = 100;

/// First 100 characters of a headline, with an ellipsis when cut.
fn headline_excerpt(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(HEADLINE_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn trend_label(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "UP",
        Trend::Down => "DOWN",
        Trend::Flat => "FLAT",
    }
}

fn sentiment_label(sentiment: SentimentClass) -> &'static str {
    match sentiment {
        SentimentClass::Positive => "POSITIVE",
        SentimentClass::Negative => "NEGATIVE",
        SentimentClass::Neutral => "NEUTRAL",
    }
}

/// Fuses forecast trend and news sentiment into a BUY/HOLD/SELL call.
pub struct RecommendationEngine {
    config: SignalConfig,
}

impl RecommendationEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn classify_trend(&self, price_change_pct: f64) -> Trend {
        let threshold = self.config.trend_threshold_pct;
        if price_change_pct > threshold {
            Trend::Up
        } else if price_change_pct < -threshold {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn classify_sentiment(&self, score: f64) -> SentimentClass {
        let threshold = self.config.sentiment_threshold;
        if score > threshold {
            SentimentClass::Positive
        } else if score < -threshold {
            SentimentClass::Negative
        } else {
            SentimentClass::Neutral
        }
    }

    /// Penalty for thin sentiment coverage, in [0.5, 1.0]. Non-decreasing in
    /// `sample_count`.
    fn sample_factor(&self, sentiment: Option<&SentimentResult>) -> f64 {
        let min = self.config.min_sentiment_samples;
        match sentiment {
            None => 0.5,
            Some(_) if min == 0 => 1.0,
            Some(s) if s.sample_count >= min => 1.0,
            Some(s) => 0.5 + 0.5 * f64::from(s.sample_count) / f64::from(min),
        }
    }

    /// Never fails; missing inputs degrade the result toward HOLD at low confidence.
    pub fn recommend(
        &self,
        current_price: f64,
        forecast: Option<&ForecastResult>,
        sentiment: Option<&SentimentResult>,
    ) -> Recommendation {
        let levels = self.config.confidence;
        let price_usable = current_price.is_finite() && current_price > 0.0;
        let usable_forecast = forecast.filter(|_| price_usable);

        if usable_forecast.is_none() && sentiment.is_none() {
            let mut reasoning = vec!["Insufficient data: forecast and sentiment both unavailable".to_string()];
            if forecast.is_some() {
                reasoning.push(format!("Current price {current_price} unusable, forecast ignored"));
            }
            reasoning.push(format!("Confidence level: Low ({:.2})", levels.floor));
            return Recommendation {
                decision: Decision::Hold,
                confidence: levels.floor,
                price_change_pct: 0.0,
                trend: Trend::Flat,
                sentiment: SentimentClass::Neutral,
                reasoning,
            };
        }

        let mut reasoning = Vec::with_capacity(5);

        let price_change_pct = match usable_forecast {
            Some(f) => (f.next_period_price - current_price) / current_price * 100.0,
            None => 0.0,
        };
        let trend = self.classify_trend(price_change_pct);
        match (usable_forecast, forecast) {
            (Some(f), _) => reasoning.push(format!(
                "Forecast {:.2} vs current {:.2}: {:+.2}% (trend {}, threshold ±{:.2}%)",
                f.next_period_price,
                current_price,
                price_change_pct,
                trend_label(trend),
                self.config.trend_threshold_pct
            )),
            (None, Some(_)) => reasoning.push(format!(
                "Current price {current_price} unusable, forecast ignored; price change assumed 0.00%"
            )),
            (None, None) => {
                reasoning.push("Forecast unavailable: price change assumed 0.00%".to_string())
            }
        }

        let sentiment_class = match sentiment {
            Some(s) => {
                let class = self.classify_sentiment(s.score);
                reasoning.push(format!(
                    "Sentiment {:+.2} from {} samples ({})",
                    s.score,
                    s.sample_count,
                    sentiment_label(class)
                ));
                class
            }
            None => {
                reasoning.push("Sentiment unavailable: treated as NEUTRAL".to_string());
                SentimentClass::Neutral
            }
        };

        let (decision, conviction) = lookup(trend, sentiment_class);
        reasoning.push(
            match (decision, conviction) {
                (Decision::Buy, _) => "Positive sentiment aligns with upward price movement",
                (Decision::Sell, _) => "Negative sentiment aligns with downward price movement",
                (_, Conviction::Conflicting) => "Conflicting signals: wait for clearer direction",
                _ => "No directional conviction: maintain current position",
            }
            .to_string(),
        );

        let mut base = match conviction {
            Conviction::Aligned => levels.high,
            Conviction::Conflicting => levels.medium,
            Conviction::Weak => levels.low,
        };
        if conviction == Conviction::Aligned {
            base = (base + (price_change_pct.abs() / 2.0).min(1.0) * 0.1).min(1.0);
        }

        let sample_factor = self.sample_factor(sentiment);
        let forecast_factor = if usable_forecast.is_some() { 1.0 } else { 0.5 };

        if let Some(s) = sentiment {
            if s.sample_count < self.config.min_sentiment_samples {
                reasoning.push(format!(
                    "Only {} sentiment samples (minimum {}): confidence reduced",
                    s.sample_count, self.config.min_sentiment_samples
                ));
            }
        }
        if usable_forecast.is_none() {
            reasoning.push("No usable forecast: confidence reduced".to_string());
        }

        if let Some(item) = sentiment.and_then(|s| s.contributing_items.first()) {
            reasoning.push(format!("Latest news: {}", headline_excerpt(&item.text)));
        }

        let confidence = (base * sample_factor * forecast_factor).clamp(levels.floor, 1.0);
        reasoning.push(format!(
            "Confidence level: {} ({:.2})",
            confidence_label(confidence),
            confidence
        ));

        Recommendation {
            decision,
            confidence,
            price_change_pct,
            trend,
            sentiment: sentiment_class,
            reasoning,
        }
    }
}
