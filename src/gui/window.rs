use gtk4::prelude::*;

use crate::config::WindowConfig;
use crate::messages::UiMsg;

const TITLE: &str = "🤖 Offline AI Voice & Text Chatbot";
const VOICE_IDLE_LABEL: &str = "🎤 Voice";
const VOICE_LISTENING_LABEL: &str = "🔴 Listening...";

/// The single application window: transcript view, text entry, Send /
/// Voice / Clear buttons and a one-line status label. All mutation happens
/// on the GTK main thread; background results arrive as `EngineMsg` drained
/// by the caller.
#[derive(Clone)]
pub struct ChatWindow {
    window: gtk4::ApplicationWindow,
    transcript_view: gtk4::TextView,
    entry: gtk4::Entry,
    voice_btn: gtk4::Button,
    status_label: gtk4::Label,
}

impl ChatWindow {
    pub fn new(
        app: &gtk4::Application,
        config: &WindowConfig,
        ui_tx: async_channel::Sender<UiMsg>,
    ) -> Self {
        install_css();

        let window = gtk4::ApplicationWindow::builder()
            .application(app)
            .title("Offline AI Voice & Text Chatbot")
            .default_width(config.width)
            .default_height(config.height)
            .build();
        window.add_css_class("banter-window");

        let root = gtk4::Box::new(gtk4::Orientation::Vertical, 0);

        let title_label = gtk4::Label::new(Some(TITLE));
        title_label.add_css_class("chat-title");
        title_label.set_margin_top(10);
        title_label.set_margin_bottom(10);
        root.append(&title_label);

        let transcript_view = gtk4::TextView::new();
        transcript_view.set_editable(false);
        transcript_view.set_cursor_visible(false);
        transcript_view.set_wrap_mode(gtk4::WrapMode::Word);
        transcript_view.add_css_class("chat-log");
        transcript_view.set_left_margin(8);
        transcript_view.set_right_margin(8);
        transcript_view.set_top_margin(8);

        let scroll = gtk4::ScrolledWindow::new();
        scroll.set_policy(gtk4::PolicyType::Never, gtk4::PolicyType::Automatic);
        scroll.set_vexpand(true);
        scroll.set_margin_start(20);
        scroll.set_margin_end(20);
        scroll.set_margin_bottom(10);
        scroll.set_child(Some(&transcript_view));
        root.append(&scroll);

        let input_row = gtk4::Box::new(gtk4::Orientation::Horizontal, 10);
        input_row.set_margin_start(20);
        input_row.set_margin_end(20);
        input_row.set_margin_bottom(10);

        let entry = gtk4::Entry::new();
        entry.set_hexpand(true);
        input_row.append(&entry);

        let send_btn = gtk4::Button::with_label("Send");
        send_btn.add_css_class("chat-send");
        input_row.append(&send_btn);

        let voice_btn = gtk4::Button::with_label(VOICE_IDLE_LABEL);
        voice_btn.add_css_class("chat-voice");
        input_row.append(&voice_btn);

        let clear_btn = gtk4::Button::with_label("Clear");
        clear_btn.add_css_class("chat-clear");
        input_row.append(&clear_btn);

        root.append(&input_row);

        let status_label = gtk4::Label::new(None);
        status_label.add_css_class("chat-status");
        status_label.set_margin_bottom(10);
        root.append(&status_label);

        window.set_child(Some(&root));

        // Submit on Return or on the Send button. Whitespace-only input is
        // left in place untouched; the engine treats it as a no-op anyway.
        let submit_tx = ui_tx.clone();
        let submit_entry = entry.clone();
        let submit = move || {
            let text = submit_entry.text().to_string();
            if text.trim().is_empty() {
                return;
            }
            let _ = submit_tx.try_send(UiMsg::Submit(text));
            submit_entry.set_text("");
        };

        let submit_clone = submit.clone();
        entry.connect_activate(move |_| submit_clone());
        let submit_clone = submit.clone();
        send_btn.connect_clicked(move |_| submit_clone());

        let voice_tx = ui_tx.clone();
        voice_btn.connect_clicked(move |_| {
            let _ = voice_tx.try_send(UiMsg::ToggleVoice);
        });

        let clear_tx = ui_tx;
        clear_btn.connect_clicked(move |_| {
            let _ = clear_tx.try_send(UiMsg::ClearChat);
        });

        Self {
            window,
            transcript_view,
            entry,
            voice_btn,
            status_label,
        }
    }

    pub fn present(&self) {
        self.window.present();
    }

    pub fn append(&self, sender: &str, text: &str) {
        let buffer = self.transcript_view.buffer();
        let mut end = buffer.end_iter();
        buffer.insert(&mut end, &format!("{}: {}\n\n", sender, text));

        let mark = buffer.create_mark(None, &buffer.end_iter(), false);
        self.transcript_view
            .scroll_to_mark(&mark, 0.0, true, 0.0, 1.0);
        buffer.delete_mark(&mark);
    }

    pub fn clear(&self) {
        self.transcript_view.buffer().set_text("");
    }

    pub fn set_status(&self, text: &str) {
        self.status_label.set_text(text);
    }

    pub fn set_listening(&self, listening: bool) {
        if listening {
            self.voice_btn.set_label(VOICE_LISTENING_LABEL);
            self.voice_btn.add_css_class("listening");
        } else {
            self.voice_btn.set_label(VOICE_IDLE_LABEL);
            self.voice_btn.remove_css_class("listening");
        }
    }

    pub fn focus_entry(&self) {
        self.entry.grab_focus();
    }
}

fn install_css() {
    let css_provider = gtk4::CssProvider::new();
    css_provider.load_from_data(
        "window.banter-window { background-color: #2C3E50; } \
         .chat-title { color: white; font-size: 20px; font-weight: bold; } \
         .chat-status { color: white; } \
         textview.chat-log, textview.chat-log text { background-color: #ECEFF1; color: #0C243C; } \
         button.chat-send { background-image: none; background-color: #3498DB; color: white; font-weight: bold; } \
         button.chat-voice { background-image: none; background-color: #E74C3C; color: white; font-weight: bold; } \
         button.chat-voice.listening { background-color: #E67E22; } \
         button.chat-clear { background-image: none; background-color: #95A5A6; color: white; font-weight: bold; }",
    );
    if let Some(display) = gtk4::gdk::Display::default() {
        gtk4::style_context_add_provider_for_display(
            &display,
            &css_provider,
            gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    }
}
