use point_keeper::config::AppConfig;
use point_keeper::infrastructure::migrate;
use point_keeper::infrastructure::sqlite_point_history::SqlitePointHistoryRepo;
use point_keeper::infrastructure::sqlite_user_point::SqliteUserPointRepo;
use point_keeper::{PointError, PointHistory, PointService, TransactionType};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};

const HISTORY_LIMIT: usize = 10;

// Быстрое пополнение
fn make_charge_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        InlineKeyboardButton::callback("➕ 1 000", "charge|1000"),
        InlineKeyboardButton::callback("➕ 5 000", "charge|5000"),
    ]])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let config = AppConfig::from_env()?;

    // 1. БД (SQLite)
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    migrate(&pool).await?;

    // 2. Сервисы
    let service = Arc::new(PointService::new(
        Arc::new(SqliteUserPointRepo::new(pool.clone())),
        Arc::new(SqlitePointHistoryRepo::new(pool)),
        config.policy,
    ));

    let bot = Bot::from_env();

    // 3. Дерево обработчиков
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    log::info!(
        "Point keeper started (max point {}, lock timeout {:?})",
        config.policy.max_point,
        config.policy.lock_timeout
    );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Ожидающие блокировку после остановки получают Interrupted
    service.shutdown();
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, service: Arc<PointService>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    // Баланс привязан к отправителю, а не к чату: так же, как в кнопках
    let Some(user_id) = msg.from.as_ref().map(|u| balance_key(u.id)) else {
        return Ok(());
    };
    let parts: Vec<&str> = text.split_whitespace().collect();

    let reply = match parts.first().copied() {
        Some("/start") | Some("/point") => match service.point(user_id).await {
            Ok(point) => format!("💳 Баланс: <b>{}</b> баллов.", point.point),
            Err(e) => describe_error(&e),
        },
        Some("/history") => match service.history(user_id).await {
            Ok(entries) => render_history(&entries),
            Err(e) => describe_error(&e),
        },
        Some(command @ ("/charge" | "/use")) => {
            let Some(amount) = parts.get(1).and_then(|raw| raw.parse::<i64>().ok()) else {
                bot.send_message(msg.chat.id, format!("Использование: {} &lt;сумма&gt;", command))
                    .parse_mode(ParseMode::Html)
                    .await?;
                return Ok(());
            };
            let result = if command == "/charge" {
                service.charge(user_id, amount).await
            } else {
                service.use_point(user_id, amount).await
            };
            match result {
                Ok(point) => format!("✅ Готово! Баланс: <b>{}</b> баллов.", point.point),
                Err(e) => describe_error(&e),
            }
        }
        _ => "📥 Команды: /point, /history, /charge &lt;сумма&gt;, /use &lt;сумма&gt;".to_string(),
    };

    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .reply_markup(make_charge_keyboard())
        .await?;
    Ok(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    service: Arc<PointService>,
) -> ResponseResult<()> {
    let user_id = balance_key(q.from.id);
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(q.from.id.into());

    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let amount = match data.split_once('|') {
        Some(("charge", raw)) => match raw.parse::<i64>() {
            Ok(amount) => amount,
            Err(_) => return Ok(()),
        },
        _ => return Ok(()),
    };

    let reply = match service.charge(user_id, amount).await {
        Ok(point) => format!("✅ Пополнено на {}. Баланс: <b>{}</b> баллов.", amount, point.point),
        Err(e) => describe_error(&e),
    };
    bot.send_message(chat_id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

fn balance_key(user: teloxide::types::UserId) -> i64 {
    user.0 as i64
}

fn render_history(entries: &[PointHistory]) -> String {
    if entries.is_empty() {
        return "📭 История пуста.".to_string();
    }
    let skip = entries.len().saturating_sub(HISTORY_LIMIT);
    let lines: Vec<String> = entries[skip..]
        .iter()
        .map(|e| {
            let sign = match e.kind {
                TransactionType::Charge => '+',
                TransactionType::Use => '-',
            };
            format!("#{} {}{} <i>({})</i>", e.id, sign, e.amount, e.kind)
        })
        .collect();
    format!("<b>🧾 Последние операции</b>\n\n{}", lines.join("\n"))
}

fn describe_error(e: &PointError) -> String {
    if e.is_retryable() {
        return "⏳ Сервер занят, попробуй ещё раз чуть позже.".to_string();
    }
    match e {
        PointError::InvalidAmount(_) => "⚠️ Сумма должна быть больше нуля.".to_string(),
        PointError::BalanceExceeded { max, .. } => {
            format!("⚠️ Баланс не может превышать {} баллов.", max)
        }
        PointError::InsufficientBalance { current, .. } => {
            format!("⚠️ Недостаточно баллов, сейчас: {}.", current)
        }
        PointError::Concurrency(_) => "🛑 Операция прервана, баланс не изменён.".to_string(),
        PointError::Store(err) => {
            log::error!("Store failure: {}", err);
            "❌ Хранилище недоступно.".to_string()
        }
    }
}
