//! Handlers of the interactive spaces and their registration table.
//!
//! Handlers mutate the Ctx (navigator included) and answer with outward
//! actions; the dispatcher applies them. Registration order is matching
//! order.

use log::debug;

use super::ctx::Mode;
use super::dispatch::{
    Answer, CommonEverything, Filter, Flow, Handler, Middleware, MiddlewareKind, Request,
};
use super::navigator::State;
use crate::error::DispatchError;
use crate::messenger::{Button, Keyboard};
use crate::models::page::PageKind;
use crate::render;
use crate::zoom::ZoomEntry;

/// Callback payloads, canonical across platforms.
pub mod payload {
    pub const BEGIN: &str = "begin";
    pub const BACK: &str = "back";
    pub const NEXT: &str = "next";
    pub const MODE_GROUP: &str = "mode_group";
    pub const MODE_TEACHER: &str = "mode_teacher";
    pub const YES: &str = "yes";
    pub const NO: &str = "no";
    pub const FINISH: &str = "finish";
    pub const DAILY: &str = "daily";
    pub const WEEKLY: &str = "weekly";
    pub const FOLD: &str = "fold";
    pub const UNFOLD: &str = "unfold";
    pub const RESEND: &str = "resend";
    pub const SETTINGS: &str = "settings";
    pub const SETTINGS_MODE: &str = "settings_mode";
    pub const SETTINGS_BROADCAST: &str = "settings_broadcast";
    pub const SETTINGS_PIN: &str = "settings_pin";
    pub const RESET: &str = "reset";
    pub const ZOOM: &str = "zoom";
    pub const ZOOM_MASS: &str = "zoom_mass";
    pub const ZOOM_DUMP: &str = "zoom_dump";
    pub const ZOOM_CLEAR: &str = "zoom_clear";
    pub const ZOOM_REMOVE: &str = "zoom_remove";
    pub const ZOOM_EDIT_NAME: &str = "zoom_edit_name";
    pub const ZOOM_EDIT_URL: &str = "zoom_edit_url";
    pub const ZOOM_EDIT_ID: &str = "zoom_edit_id";
    pub const ZOOM_EDIT_PWD: &str = "zoom_edit_pwd";
    pub const ZOOM_EDIT_NOTES: &str = "zoom_edit_notes";
    pub const PAGE_PREV: &str = "page_prev";
    pub const PAGE_NEXT: &str = "page_next";
    pub const ADMIN_UPDATE: &str = "admin_update";
    /// Prefix for entry selection in the Zoom browse screen.
    pub const ZOOM_ENTRY_PREFIX: &str = "zoom_entry:";
}

const ZOOM_PAGE_SIZE: usize = 6;

fn button(text: &str, payload: &str) -> Button {
    Button::new(text, payload)
}

fn back_row() -> Vec<Button> {
    vec![button("← Назад", payload::BACK)]
}

// ---------------------------------------------------------------- screens

/// Builds the text and keyboard of the current state's screen.
pub fn screen(req: &Request<'_>) -> (String, Keyboard) {
    match req.ctx.navigator.current() {
        State::InitMain => (
            "Привет! Я покажу расписание и предупрежу, когда его поменяют.".to_string(),
            Keyboard::default().row(vec![button("Поехали", payload::BEGIN)]),
        ),
        State::InitMode | State::SettingsMode => (
            "Ты группа или преподаватель?".to_string(),
            Keyboard::default()
                .row(vec![
                    button("Группа", payload::MODE_GROUP),
                    button("Преподаватель", payload::MODE_TEACHER),
                ])
                .row(back_row()),
        ),
        State::InitGroup | State::SettingsGroup => (
            "Напиши название группы, например 1-КДД-69".to_string(),
            Keyboard::default().row(back_row()),
        ),
        State::InitTeacher | State::SettingsTeacher => (
            "Напиши фамилию с инициалами, например Ебанько Х.Й.".to_string(),
            Keyboard::default().row(back_row()),
        ),
        State::InitBroadcast | State::SettingsBroadcast => (
            "Присылать изменения расписания?".to_string(),
            Keyboard::default()
                .row(vec![button("Да", payload::YES), button("Нет", payload::NO)])
                .row(back_row()),
        ),
        State::InitShouldPin | State::SettingsShouldPin => (
            "Закреплять сообщение с расписанием?".to_string(),
            Keyboard::default()
                .row(vec![button("Да", payload::YES), button("Нет", payload::NO)])
                .row(back_row()),
        ),
        State::InitFinish => {
            let identifier = req.ctx.identifier.as_deref().unwrap_or("—");
            (
                format!("Готово! Буду показывать расписание для {identifier}."),
                Keyboard::default().row(vec![button("В хаб", payload::FINISH)]),
            )
        }
        State::HubMain => hub_screen(req),
        State::SettingsMain => settings_screen(req),
        State::ResetConfirm => (
            "Точно сбросить всё? Контекст будет удалён.".to_string(),
            Keyboard::default()
                .row(vec![button("Да, сбросить", payload::YES)])
                .row(back_row()),
        ),
        State::ZoomBrowse => zoom_browse_screen(req),
        State::ZoomMass => (
            "Пришли записи: каждая строка станет именем новой записи.".to_string(),
            Keyboard::default().row(back_row()),
        ),
        State::ZoomEntry => zoom_entry_screen(req),
        State::ZoomEditName => prompt("Новое имя записи:"),
        State::ZoomEditUrl => prompt("Новая ссылка:"),
        State::ZoomEditId => prompt("Новый ID:"),
        State::ZoomEditPwd => prompt("Новый пароль:"),
        State::ZoomEditNotes => prompt("Новые заметки:"),
        State::ZoomDump => (
            {
                let dump = req.ctx.settings.zoom.dump();
                if dump.is_empty() {
                    "Записей нет.".to_string()
                } else {
                    dump
                }
            },
            Keyboard::default().row(back_row()),
        ),
        State::ZoomConfirmRemove => (
            format!(
                "Удалить запись {}?",
                req.ctx.zoom_selected.as_deref().unwrap_or("—")
            ),
            Keyboard::default()
                .row(vec![button("Да", payload::YES)])
                .row(back_row()),
        ),
        State::ZoomConfirmClear => (
            "Удалить все записи Zoom?".to_string(),
            Keyboard::default()
                .row(vec![button("Да", payload::YES)])
                .row(back_row()),
        ),
        State::AdminMain => (
            format!(
                "Админка. Подписок на рассылку: {}.",
                req.subscriber_count
            ),
            Keyboard::default()
                .row(vec![button("Обновить расписание", payload::ADMIN_UPDATE)])
                .row(back_row()),
        ),
    }
}

fn prompt(text: &str) -> (String, Keyboard) {
    (text.to_string(), Keyboard::default().row(back_row()))
}

fn hub_screen(req: &Request<'_>) -> (String, Keyboard) {
    let kind = req.ctx.schedule.message.kind.unwrap_or(PageKind::Weekly);
    let folded = req.ctx.schedule.message.is_folded;

    let text = match (&req.ctx.identifier, req.page_for(kind)) {
        (None, _) => "Сначала скажи, чьё расписание показывать — загляни в настройки.".to_string(),
        (Some(identifier), Some(page)) => {
            render::render_page(page, identifier, &req.ctx.settings.zoom, folded)
                .unwrap_or_else(|| format!("В расписании нет формирования {identifier}."))
        }
        (Some(_), None) => "Расписание сейчас недоступно, попробуй позже.".to_string(),
    };

    let switch = match kind {
        PageKind::Weekly => button("На день", payload::DAILY),
        PageKind::Daily => button("На неделю", payload::WEEKLY),
    };
    let fold = if folded {
        button("Развернуть", payload::UNFOLD)
    } else {
        button("Свернуть", payload::FOLD)
    };
    let keyboard = Keyboard::default()
        .row(vec![switch, fold])
        .row(vec![
            button("Обновить", payload::RESEND),
            button("Настройки", payload::SETTINGS),
        ]);
    (text, keyboard)
}

fn settings_screen(req: &Request<'_>) -> (String, Keyboard) {
    let ctx = &req.ctx;
    let mode = match ctx.mode {
        Some(Mode::Group) => "группа",
        Some(Mode::Teacher) => "преподаватель",
        None => "—",
    };
    let text = format!(
        "Настройки\nРежим: {}\nИдентификатор: {}\nРассылка: {}\nЗакреплять: {}\nZoom-записей: {}",
        mode,
        ctx.identifier.as_deref().unwrap_or("—"),
        if ctx.settings.broadcast { "вкл" } else { "выкл" },
        if ctx.settings.should_pin { "вкл" } else { "выкл" },
        ctx.settings.zoom.len(),
    );
    let mut keyboard = Keyboard::default()
        .row(vec![button("Режим и идентификатор", payload::SETTINGS_MODE)])
        .row(vec![
            button("Рассылка", payload::SETTINGS_BROADCAST),
            button("Закреп", payload::SETTINGS_PIN),
        ])
        .row(vec![
            button("Zoom", payload::ZOOM),
            button("Сброс", payload::RESET),
        ]);
    keyboard = keyboard.row(back_row());
    (text, keyboard)
}

fn zoom_browse_screen(req: &Request<'_>) -> (String, Keyboard) {
    let entries: Vec<&ZoomEntry> = req.ctx.settings.zoom.iter().collect();
    let pages = entries.chunks(ZOOM_PAGE_SIZE).count().max(1);
    let page = req.ctx.pagination.page.min(pages - 1);
    let shown = entries
        .iter()
        .skip(page * ZOOM_PAGE_SIZE)
        .take(ZOOM_PAGE_SIZE);

    let mut keyboard = Keyboard::default();
    let mut lines = vec![format!("Zoom-записи, стр. {}/{}", page + 1, pages)];
    for entry in shown {
        lines.push(format!("• {}", entry.name));
        keyboard = keyboard.row(vec![Button::new(
            entry.name.clone(),
            format!("{}{}", payload::ZOOM_ENTRY_PREFIX, entry.name),
        )]);
    }
    if entries.is_empty() {
        lines.push("Пока пусто.".to_string());
    }
    let mut nav_row = Vec::new();
    if page > 0 {
        nav_row.push(button("←", payload::PAGE_PREV));
    }
    if page + 1 < pages {
        nav_row.push(button("→", payload::PAGE_NEXT));
    }
    if !nav_row.is_empty() {
        keyboard = keyboard.row(nav_row);
    }
    keyboard = keyboard
        .row(vec![
            button("Добавить пачкой", payload::ZOOM_MASS),
            button("Выгрузить", payload::ZOOM_DUMP),
        ])
        .row(vec![button("Удалить все", payload::ZOOM_CLEAR)])
        .row(back_row());
    (lines.join("\n"), keyboard)
}

fn zoom_entry_screen(req: &Request<'_>) -> (String, Keyboard) {
    let name = req.ctx.zoom_selected.as_deref().unwrap_or("—");
    let text = match req.ctx.settings.zoom.get(name) {
        Some(entry) => {
            let body = entry.text_full();
            if body.is_empty() {
                format!("{}\n(полей нет)", entry.name)
            } else {
                format!("{}\n{}", entry.name, body)
            }
        }
        None => "Запись не найдена.".to_string(),
    };
    let keyboard = Keyboard::default()
        .row(vec![
            button("Имя", payload::ZOOM_EDIT_NAME),
            button("Ссылка", payload::ZOOM_EDIT_URL),
        ])
        .row(vec![
            button("ID", payload::ZOOM_EDIT_ID),
            button("Пароль", payload::ZOOM_EDIT_PWD),
            button("Заметки", payload::ZOOM_EDIT_NOTES),
        ])
        .row(vec![button("Удалить", payload::ZOOM_REMOVE)])
        .row(back_row());
    (text, keyboard)
}

impl<'a> Request<'a> {
    fn page_for(&self, kind: PageKind) -> Option<&'a crate::models::page::Page> {
        match kind {
            PageKind::Daily => self.daily,
            PageKind::Weekly => self.weekly,
        }
    }
}

// ------------------------------------------------------------- responding

/// Standard reply: edit the tracked message when the pressed button belongs
/// to it, otherwise toast about the stale button and send a fresh screen.
fn respond(req: &Request<'_>) -> Answer {
    let (text, keyboard) = screen(req);
    if let CommonEverything::Event(event) = req.everything {
        if req.ctx.schedule.message.id == Some(event.message_id) {
            return Answer::edit(event.message_id, text, Some(keyboard));
        }
        // Track the fresh copy so its buttons edit in place next time.
        return Answer::notify("Эта кнопка устарела, держи свежий экран")
            .then_send_tracked(text, Some(keyboard));
    }
    Answer::send_tracked(text, Some(keyboard))
}

/// Reply that always sends a fresh tracked message, replacing the current
/// screen (used after text input, where editing makes no sense).
fn respond_fresh(req: &Request<'_>) -> Answer {
    let (text, keyboard) = screen(req);
    Answer::send_tracked(text, Some(keyboard))
}

// --------------------------------------------------------------- handlers

fn hr(
    name: &'static str,
    filters: Vec<Filter>,
    func: super::dispatch::HandlerFn,
) -> Handler {
    Handler {
        name,
        filters,
        is_blocking: true,
        func,
    }
}

fn on_back(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    // No-op at the space root: just re-render.
    req.ctx.navigator.back();
    Ok(respond(req))
}

fn on_next(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.next();
    Ok(respond(req))
}

fn on_begin(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::InitMode);
    Ok(respond(req))
}

fn on_mode(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let mode = match req.everything.payload() {
        Some(payload::MODE_GROUP) => Mode::Group,
        _ => Mode::Teacher,
    };
    req.ctx.schedule.temp_mode = Some(mode);
    let in_settings = req.ctx.navigator.current() == State::SettingsMode;
    let next = match (mode, in_settings) {
        (Mode::Group, false) => State::InitGroup,
        (Mode::Teacher, false) => State::InitTeacher,
        (Mode::Group, true) => State::SettingsGroup,
        (Mode::Teacher, true) => State::SettingsTeacher,
    };
    req.ctx.navigator.append(next);
    Ok(respond(req))
}

fn on_identifier_input(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let Some(text) = req.everything.text() else {
        return Err(DispatchError::NoContext);
    };
    let identifier = text.trim().to_string();
    if identifier.is_empty() {
        return Err(DispatchError::Frontend(
            "Пустое имя не подойдёт, попробуй ещё раз".to_string(),
        ));
    }

    let state = req.ctx.navigator.current();
    let mode = match state {
        State::InitGroup | State::SettingsGroup => Mode::Group,
        _ => Mode::Teacher,
    };

    // Validation hint against the cached weekly page, when there is one.
    let known = req
        .weekly
        .map(|page| page.formation(&identifier).is_some())
        .unwrap_or(true);

    match mode {
        Mode::Group => req.ctx.schedule.temp_group = Some(identifier.clone()),
        Mode::Teacher => req.ctx.schedule.temp_teacher = Some(identifier.clone()),
    }
    req.ctx.mode = Some(mode);
    req.ctx.identifier = Some(identifier.clone());

    let next = match state {
        State::InitGroup | State::InitTeacher => State::InitBroadcast,
        _ => State::SettingsMain,
    };
    req.ctx.navigator.append(next);

    let mut answer = Answer::none();
    if !known {
        answer = answer.then_notify(format!(
            "{identifier} не нашлось в свежем расписании, оставил как есть"
        ));
    }
    Ok(answer.merge(respond_fresh(req)))
}

fn on_broadcast_choice(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.settings.broadcast = req.everything.payload() == Some(payload::YES);
    let in_settings = req.ctx.navigator.current() == State::SettingsBroadcast;
    let next = if in_settings {
        State::SettingsMain
    } else if req.ctx.navigator.is_ignored(State::InitShouldPin) {
        State::InitFinish
    } else {
        State::InitShouldPin
    };
    req.ctx.navigator.append(next);
    Ok(respond(req))
}

fn on_pin_choice(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.settings.should_pin = req.everything.payload() == Some(payload::YES);
    let in_settings = req.ctx.navigator.current() == State::SettingsShouldPin;
    let next = if in_settings {
        State::SettingsMain
    } else {
        State::InitFinish
    };
    req.ctx.navigator.append(next);
    Ok(respond(req))
}

fn on_finish(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.clear_all(State::HubMain);
    Ok(respond_fresh(req))
}

fn on_hub_switch(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.schedule.message.kind = Some(match req.everything.payload() {
        Some(payload::DAILY) => PageKind::Daily,
        _ => PageKind::Weekly,
    });
    Ok(respond(req))
}

fn on_hub_fold(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.schedule.message.is_folded = req.everything.payload() == Some(payload::FOLD);
    Ok(respond(req))
}

fn on_hub_resend(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    Ok(respond_fresh(req))
}

fn on_open_settings(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::SettingsMain);
    Ok(respond(req))
}

fn on_settings_mode(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::SettingsMode);
    Ok(respond(req))
}

fn on_settings_broadcast(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::SettingsBroadcast);
    Ok(respond(req))
}

fn on_settings_pin(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    if req.ctx.navigator.is_ignored(State::SettingsShouldPin) {
        return Err(DispatchError::Frontend(
            "В личном чате закреплять нечего".to_string(),
        ));
    }
    req.ctx.navigator.append(State::SettingsShouldPin);
    Ok(respond(req))
}

fn on_reset_open(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::ResetConfirm);
    Ok(respond(req))
}

fn on_reset_confirm(_req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let mut answer = Answer::send("Контекст сброшен. Напиши что-нибудь, начнём заново.", None);
    answer.reset_ctx = true;
    Ok(answer)
}

fn on_zoom_open(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.pagination.page = 0;
    req.ctx.navigator.append(State::ZoomBrowse);
    Ok(respond(req))
}

fn on_zoom_page(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let pages = (req.ctx.settings.zoom.len() + ZOOM_PAGE_SIZE - 1) / ZOOM_PAGE_SIZE;
    let pages = pages.max(1);
    let page = &mut req.ctx.pagination.page;
    match req.everything.payload() {
        Some(payload::PAGE_NEXT) if *page + 1 < pages => *page += 1,
        Some(payload::PAGE_PREV) if *page > 0 => *page -= 1,
        _ => {}
    }
    Ok(respond(req))
}

fn on_zoom_select(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let Some(payload) = req.everything.payload() else {
        return Err(DispatchError::NoContext);
    };
    let Some(name) = payload.strip_prefix(payload::ZOOM_ENTRY_PREFIX) else {
        // Not an entry button; nothing else lives in this state.
        return Ok(respond(req));
    };
    if req.ctx.settings.zoom.get(name).is_none() {
        return Err(DispatchError::Frontend("Такой записи уже нет".to_string()));
    }
    req.ctx.zoom_selected = Some(name.to_string());
    req.ctx.navigator.append(State::ZoomEntry);
    Ok(respond(req))
}

fn on_zoom_mass_open(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::ZoomMass);
    Ok(respond(req))
}

fn on_zoom_mass_input(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let Some(text) = req.everything.text() else {
        return Err(DispatchError::NoContext);
    };
    let mut added = 0;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        req.ctx.settings.zoom.put(ZoomEntry::named(line));
        added += 1;
    }
    req.ctx.navigator.append(State::ZoomBrowse);
    Ok(Answer::notify(format!("Добавлено записей: {added}")).merge(respond_fresh(req)))
}

fn on_zoom_dump(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::ZoomDump);
    Ok(respond(req))
}

fn on_zoom_clear_open(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::ZoomConfirmClear);
    Ok(respond(req))
}

fn on_zoom_clear_confirm(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.settings.zoom.clear();
    req.ctx.zoom_selected = None;
    req.ctx.navigator.append(State::ZoomBrowse);
    Ok(respond(req))
}

fn on_zoom_remove_open(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    req.ctx.navigator.append(State::ZoomConfirmRemove);
    Ok(respond(req))
}

fn on_zoom_remove_confirm(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let name = req.ctx.zoom_selected.clone().unwrap_or_default();
    req.ctx
        .settings
        .zoom
        .remove(&name)
        .map_err(|err| DispatchError::Frontend(err.to_string()))?;
    // Drop the selection only once the entry is gone.
    req.ctx.zoom_selected = None;
    req.ctx.navigator.append(State::ZoomBrowse);
    Ok(respond(req))
}

fn on_zoom_edit_open(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let next = match req.everything.payload() {
        Some(payload::ZOOM_EDIT_NAME) => State::ZoomEditName,
        Some(payload::ZOOM_EDIT_URL) => State::ZoomEditUrl,
        Some(payload::ZOOM_EDIT_ID) => State::ZoomEditId,
        Some(payload::ZOOM_EDIT_PWD) => State::ZoomEditPwd,
        _ => State::ZoomEditNotes,
    };
    req.ctx.navigator.append(next);
    Ok(respond(req))
}

fn on_zoom_edit_input(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    let Some(text) = req.everything.text() else {
        return Err(DispatchError::NoContext);
    };
    let value = text.trim().to_string();
    let state = req.ctx.navigator.current();
    let selected = req
        .ctx
        .zoom_selected
        .clone()
        .ok_or(DispatchError::NoContext)?;

    if state == State::ZoomEditName {
        req.ctx
            .settings
            .zoom
            .rename(&selected, &value)
            .map_err(|err| DispatchError::Frontend(err.to_string()))?;
        req.ctx.zoom_selected = Some(value);
    } else {
        let entry = req
            .ctx
            .settings
            .zoom
            .get_mut(&selected)
            .ok_or(DispatchError::NoContext)?;
        let slot = match state {
            State::ZoomEditUrl => &mut entry.url,
            State::ZoomEditId => &mut entry.id,
            State::ZoomEditPwd => &mut entry.pwd,
            _ => &mut entry.notes,
        };
        *slot = if value.is_empty() { None } else { Some(value) };
    }
    req.ctx.navigator.append(State::ZoomEntry);
    Ok(respond_fresh(req))
}

fn on_admin_open(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    if !req.is_admin() {
        return Ok(Answer::none());
    }
    req.ctx.navigator.append(State::AdminMain);
    Ok(respond_fresh(req))
}

fn on_admin_update(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    if !req.is_admin() {
        return Err(DispatchError::Frontend("Эта кнопка не для тебя".to_string()));
    }
    req.wants_update = true;
    Ok(Answer::notify("Попросил сервер перечитать источники"))
}

/// Any message in a state that expects no text just re-renders the screen.
fn on_stray_message(req: &mut Request<'_>) -> Result<Answer, DispatchError> {
    Ok(respond_fresh(req))
}

impl Answer {
    fn merge(mut self, other: Answer) -> Answer {
        self.actions.extend(other.actions);
        self.avoid_post |= other.avoid_post;
        self.reset_ctx |= other.reset_ctx;
        self
    }
}

// ----------------------------------------------------------- registration

/// The handler table, in matching order.
pub fn handlers() -> Vec<Handler> {
    use Filter::{Command, EventOnly, MessageOnly, Payload, Union};
    // `Filter::State` would shadow the state enum, so it stays qualified.
    let at = Filter::State;
    vec![
        // Navigation that works everywhere.
        hr("back", vec![EventOnly, Payload(payload::BACK)], on_back),
        hr("next", vec![EventOnly, Payload(payload::NEXT)], on_next),
        // Admin entry by command.
        hr("admin_open", vec![MessageOnly, Command("/admin")], on_admin_open),
        hr(
            "admin_update",
            vec![EventOnly, at(State::AdminMain), Payload(payload::ADMIN_UPDATE)],
            on_admin_update,
        ),
        // Onboarding.
        hr(
            "init_begin",
            vec![EventOnly, at(State::InitMain), Payload(payload::BEGIN)],
            on_begin,
        ),
        hr(
            "mode_choice",
            vec![
                EventOnly,
                Union(vec![at(State::InitMode), at(State::SettingsMode)]),
                Union(vec![Payload(payload::MODE_GROUP), Payload(payload::MODE_TEACHER)]),
            ],
            on_mode,
        ),
        hr(
            "identifier_input",
            vec![
                MessageOnly,
                Union(vec![
                    at(State::InitGroup),
                    at(State::InitTeacher),
                    at(State::SettingsGroup),
                    at(State::SettingsTeacher),
                ]),
            ],
            on_identifier_input,
        ),
        hr(
            "broadcast_choice",
            vec![
                EventOnly,
                Union(vec![at(State::InitBroadcast), at(State::SettingsBroadcast)]),
                Union(vec![Payload(payload::YES), Payload(payload::NO)]),
            ],
            on_broadcast_choice,
        ),
        hr(
            "pin_choice",
            vec![
                EventOnly,
                Union(vec![at(State::InitShouldPin), at(State::SettingsShouldPin)]),
                Union(vec![Payload(payload::YES), Payload(payload::NO)]),
            ],
            on_pin_choice,
        ),
        hr(
            "init_finish",
            vec![EventOnly, at(State::InitFinish), Payload(payload::FINISH)],
            on_finish,
        ),
        // Hub.
        hr(
            "hub_switch",
            vec![
                EventOnly,
                at(State::HubMain),
                Union(vec![Payload(payload::DAILY), Payload(payload::WEEKLY)]),
            ],
            on_hub_switch,
        ),
        hr(
            "hub_fold",
            vec![
                EventOnly,
                at(State::HubMain),
                Union(vec![Payload(payload::FOLD), Payload(payload::UNFOLD)]),
            ],
            on_hub_fold,
        ),
        hr(
            "hub_resend",
            vec![EventOnly, at(State::HubMain), Payload(payload::RESEND)],
            on_hub_resend,
        ),
        hr(
            "open_settings",
            vec![EventOnly, at(State::HubMain), Payload(payload::SETTINGS)],
            on_open_settings,
        ),
        // Settings.
        hr(
            "settings_mode",
            vec![EventOnly, at(State::SettingsMain), Payload(payload::SETTINGS_MODE)],
            on_settings_mode,
        ),
        hr(
            "settings_broadcast",
            vec![EventOnly, at(State::SettingsMain), Payload(payload::SETTINGS_BROADCAST)],
            on_settings_broadcast,
        ),
        hr(
            "settings_pin",
            vec![EventOnly, at(State::SettingsMain), Payload(payload::SETTINGS_PIN)],
            on_settings_pin,
        ),
        hr(
            "reset_open",
            vec![EventOnly, at(State::SettingsMain), Payload(payload::RESET)],
            on_reset_open,
        ),
        hr(
            "reset_confirm",
            vec![EventOnly, at(State::ResetConfirm), Payload(payload::YES)],
            on_reset_confirm,
        ),
        // Zoom catalog.
        hr(
            "zoom_open",
            vec![EventOnly, at(State::SettingsMain), Payload(payload::ZOOM)],
            on_zoom_open,
        ),
        hr(
            "zoom_page",
            vec![
                EventOnly,
                at(State::ZoomBrowse),
                Union(vec![Payload(payload::PAGE_PREV), Payload(payload::PAGE_NEXT)]),
            ],
            on_zoom_page,
        ),
        hr(
            "zoom_mass_open",
            vec![EventOnly, at(State::ZoomBrowse), Payload(payload::ZOOM_MASS)],
            on_zoom_mass_open,
        ),
        hr(
            "zoom_mass_input",
            vec![MessageOnly, at(State::ZoomMass)],
            on_zoom_mass_input,
        ),
        hr(
            "zoom_dump",
            vec![EventOnly, at(State::ZoomBrowse), Payload(payload::ZOOM_DUMP)],
            on_zoom_dump,
        ),
        hr(
            "zoom_clear_open",
            vec![EventOnly, at(State::ZoomBrowse), Payload(payload::ZOOM_CLEAR)],
            on_zoom_clear_open,
        ),
        hr(
            "zoom_clear_confirm",
            vec![EventOnly, at(State::ZoomConfirmClear), Payload(payload::YES)],
            on_zoom_clear_confirm,
        ),
        hr("zoom_select", vec![EventOnly, at(State::ZoomBrowse)], on_zoom_select),
        hr(
            "zoom_remove_open",
            vec![EventOnly, at(State::ZoomEntry), Payload(payload::ZOOM_REMOVE)],
            on_zoom_remove_open,
        ),
        hr(
            "zoom_remove_confirm",
            vec![EventOnly, at(State::ZoomConfirmRemove), Payload(payload::YES)],
            on_zoom_remove_confirm,
        ),
        hr(
            "zoom_edit_open",
            vec![
                EventOnly,
                at(State::ZoomEntry),
                Union(vec![
                    Payload(payload::ZOOM_EDIT_NAME),
                    Payload(payload::ZOOM_EDIT_URL),
                    Payload(payload::ZOOM_EDIT_ID),
                    Payload(payload::ZOOM_EDIT_PWD),
                    Payload(payload::ZOOM_EDIT_NOTES),
                ]),
            ],
            on_zoom_edit_open,
        ),
        hr(
            "zoom_edit_input",
            vec![
                MessageOnly,
                Union(vec![
                    at(State::ZoomEditName),
                    at(State::ZoomEditUrl),
                    at(State::ZoomEditId),
                    at(State::ZoomEditPwd),
                    at(State::ZoomEditNotes),
                ]),
            ],
            on_zoom_edit_input,
        ),
        // Fallback: any other message re-renders the current screen.
        hr("stray_message", vec![MessageOnly], on_stray_message),
    ]
}

/// The middleware chain.
pub fn middlewares() -> Vec<Middleware> {
    vec![
        Middleware {
            name: "trace_event",
            kind: MiddlewareKind::Always,
            pre: Some(|req| {
                debug!(
                    "event from {} in {:?}",
                    req.everything.key().file_stem(),
                    req.ctx.navigator.current()
                );
                Flow::Continue
            }),
            post: None,
        },
        Middleware {
            name: "environment_ignores",
            kind: MiddlewareKind::Always,
            pre: Some(|req| {
                // Nothing to pin in a private chat.
                if req.everything.key().is_private() {
                    req.ctx.navigator.ignore(State::InitShouldPin);
                    req.ctx.navigator.ignore(State::SettingsShouldPin);
                } else {
                    req.ctx.navigator.unignore(State::InitShouldPin);
                    req.ctx.navigator.unignore(State::SettingsShouldPin);
                }
                Flow::Continue
            }),
            post: None,
        },
    ]
}
