//! `tracing`のイベントをバッファに蓄積するレイヤー

use std::fmt::{self, Write};

use tracing::{
    field::{Field, Visit},
    Event, Subscriber,
};
use tracing_subscriber::layer::{Context, Layer};

use crate::{entry::SourceLocation, level::Level, logger::Logger};

/// このクレート自身が出力するイベントのターゲット
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");
const OWN_MODULE_PREFIX: &str = concat!(env!("CARGO_CRATE_NAME"), "::");

fn is_own_target(target: &str) -> bool {
    target == OWN_TARGET || target.starts_with(OWN_MODULE_PREFIX)
}

/// `tracing`のイベントを[`Logger`]に記録するレイヤー
///
/// カテゴリにはイベントのターゲットを使う。
pub struct BufferedLayer {
    logger: Logger,
}

impl BufferedLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

/// `message`フィールドと、それ以外のフィールドを`key=value`として集める
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, field: &Field, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        write!(self.fields, "{}={}", field.name(), value).ok();
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.push_field(field, format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field, format_args!("{}", value));
        }
    }
}

impl<S> Layer<S> for BufferedLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // ロガー内部のイベントを記録するとロックを二重に取得してしまう
        if is_own_target(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let location = SourceLocation::new(
            metadata.file().unwrap_or("<unknown>"),
            metadata.line().unwrap_or(0),
        );
        let level = Level::from(*metadata.level());

        if let Err(e) = self
            .logger
            .log_at(level, visitor.into_message(), metadata.target(), location)
        {
            // tracingで出力するとこのレイヤーに戻ってくるため、標準エラー出力に書く
            eprintln!("failed to record log event: {}", e);
        }
    }
}
