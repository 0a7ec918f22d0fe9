//! Explanation text generation.
//!
//! The generator is only called on a cache miss. Backends implement
//! [`ExplanationGenerator`]; [`TemplateGenerator`] is the offline backend used
//! when no language model key is configured.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ChartPeriod, IndicatorSet, PriceBar};

/// Disclaimer every explanation must end with.
pub const DISCLAIMER: &str = "投資判断はご自身でお決めください";

/// Errors from a generation backend.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Generation backend error: {0}")]
    Backend(String),

    #[error("Empty response from generation backend")]
    EmptyResponse,

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Inputs handed to a generator.
#[derive(Debug, Clone)]
pub struct ExplanationContext {
    pub stock_code: String,
    pub period: ChartPeriod,
    pub bars: Vec<PriceBar>,
    pub indicators: IndicatorSet,
}

impl ExplanationContext {
    fn latest(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    fn day_change_pct(&self) -> f64 {
        match self.bars.as_slice() {
            [.., prev, last] if prev.close != 0.0 => (last.close - prev.close) / prev.close * 100.0,
            _ => 0.0,
        }
    }
}

/// Generated text plus the token count reported by the backend, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub text: String,
    pub tokens_used: Option<u32>,
}

/// Backend producing a natural-language explanation of the indicators.
#[async_trait]
pub trait ExplanationGenerator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn generate(&self, ctx: &ExplanationContext) -> Result<GeneratedText, GenerationError>;
}

/// Make sure the text names the stock and carries the disclaimer.
pub fn ensure_contract(text: &str, stock_code: &str) -> String {
    let mut text = text.trim().to_string();
    if !text.contains(stock_code) {
        text = format!("【{}】{}", stock_code, text);
    }
    if !text.contains(DISCLAIMER) {
        text.push('\n');
        text.push_str(DISCLAIMER);
        text.push('。');
    }
    text
}

fn yen(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}円", v))
        .unwrap_or_else(|| "データ不足".to_string())
}

/// Prompt for language model backends, aimed at beginner investors.
pub fn build_prompt(ctx: &ExplanationContext) -> String {
    let ind = &ctx.indicators;
    let (close, volume) = ctx
        .latest()
        .map(|b| (b.close, b.volume))
        .unwrap_or((0.0, 0));
    let diff = |avg: Option<f64>| {
        avg.map(|a| format!("{:.2}円", close - a))
            .unwrap_or_else(|| "-".to_string())
    };

    format!(
        "株式コード {code} の{period}チャート分析をお願いします。

【現在の状況】
- 現在価格: {close:.2}円
- 前日比: {change:+.2}%
- 出来高: {volume}株

【テクニカル指標】
- SMA25日: {sma25} (現在価格との差: {diff25})
- SMA75日: {sma75} (現在価格との差: {diff75})
- RSI(14日): {rsi}
- MACD: {macd} (シグナル: {signal})

【分析依頼】
投資初心者の方向けに、以下の点で分析してください：
1. 現在のトレンド状況（上昇・下降・横ばい）
2. テクニカル指標から読み取れる状況
3. 初心者向けのやさしいアドバイス

【注意事項】
- 具体的な売買判断は避けてください
- やさしく分かりやすい言葉で説明してください
- 150文字以内でお願いします
- 最後に「{disclaimer}」を追加してください
",
        code = ctx.stock_code,
        period = ctx.period,
        close = close,
        change = ctx.day_change_pct(),
        volume = volume,
        sma25 = yen(ind.sma_25),
        diff25 = diff(ind.sma_25),
        sma75 = yen(ind.sma_75),
        diff75 = diff(ind.sma_75),
        rsi = ind
            .rsi_14
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "-".to_string()),
        macd = ind
            .macd_line
            .map(|v| format!("{:.3}", v))
            .unwrap_or_else(|| "-".to_string()),
        signal = ind
            .macd_signal
            .map(|v| format!("{:.3}", v))
            .unwrap_or_else(|| "-".to_string()),
        disclaimer = DISCLAIMER,
    )
}

/// Rule-based generator that needs no external service.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn render(ctx: &ExplanationContext) -> String {
        let ind = &ctx.indicators;

        let trend = match (ind.sma_25, ind.sma_75) {
            (Some(short), Some(long)) if short > long => "上昇トレンド",
            (Some(_), Some(_)) => "下降トレンド",
            _ => "横ばい",
        };

        let rsi_desc = match ind.rsi_14 {
            Some(rsi) if rsi > 70.0 => "買われすぎ",
            Some(rsi) if rsi < 30.0 => "売られすぎ",
            _ => "適正水準",
        };

        let momentum = match ind.macd_histogram {
            Some(h) if h > 0.0 => "上昇の勢いがあります",
            _ => "下降の勢いがみられます",
        };

        let rsi_value = ind
            .rsi_14
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "-".to_string());

        format!(
            "現在、{code}は{trend}にあります。\n\
             RSIは{rsi_desc}の状態で、{momentum}。\n\
             （SMA25: {sma25} / SMA75: {sma75} / RSI14: {rsi}）\n\
             短期移動平均線が長期線を上回っている場合は比較的良好な状況ですが、\n\
             {disclaimer}。",
            code = ctx.stock_code,
            trend = trend,
            rsi_desc = rsi_desc,
            momentum = momentum,
            sma25 = yen(ind.sma_25),
            sma75 = yen(ind.sma_75),
            rsi = rsi_value,
            disclaimer = DISCLAIMER,
        )
    }
}

#[async_trait]
impl ExplanationGenerator for TemplateGenerator {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn generate(&self, ctx: &ExplanationContext) -> Result<GeneratedText, GenerationError> {
        Ok(GeneratedText {
            text: Self::render(ctx),
            tokens_used: None,
        })
    }
}
