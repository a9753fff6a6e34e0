//! Peer Duel entry point
//!
//! Browser glue: wires the negotiation state machine to RTCPeerConnection and
//! the relay WebSocket, DOM input listeners to the input buffers, and the
//! animation-frame callback to the frame loop. All game and protocol
//! decisions live in the library; this file only executes session commands
//! against the platform.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::{JsFuture, spawn_local};
    use web_sys::{
        CanvasRenderingContext2d, HtmlCanvasElement, KeyboardEvent, MessageEvent, MouseEvent,
        RtcConfiguration, RtcDataChannel, RtcDataChannelEvent, RtcIceCandidateInit,
        RtcIceServer, RtcPeerConnection, RtcPeerConnectionIceEvent, RtcSdpType,
        RtcSessionDescriptionInit, WebSocket,
    };

    use peer_duel::game::{FrameLoop, FrameOutput};
    use peer_duel::input::{LocalInput, RemoteInput};
    use peer_duel::net::{
        CandidateDescriptor, ChannelMsg, Command, Role, Session, SessionDescription,
        SignalEnvelope,
    };
    use peer_duel::sim::{Board, PlayerId};
    use peer_duel::GameConfig;

    fn now_ms() -> f64 {
        js_sys::Date::now()
    }

    /// Everything one peer holds for a connect attempt
    struct App {
        config: GameConfig,
        session: Session,
        pc: Option<RtcPeerConnection>,
        channel: Option<RtcDataChannel>,
        ws: Option<WebSocket>,
        game: Option<FrameLoop>,
        local: LocalInput,
        remote: RemoteInput,
        canvas: HtmlCanvasElement,
        ctx: CanvasRenderingContext2d,
    }

    impl App {
        fn new(canvas: HtmlCanvasElement, ctx: CanvasRenderingContext2d) -> Self {
            let local_id = format!(
                "peer-{:08x}",
                (js_sys::Math::random() * u32::MAX as f64) as u32
            );
            // Write the config back on startup so the stored copy exists
            // (with defaults filled in) for the user to edit
            let config = GameConfig::load();
            config.save();
            Self {
                config,
                session: Session::new(local_id),
                pc: None,
                channel: None,
                ws: None,
                game: None,
                local: LocalInput::default(),
                remote: RemoteInput::default(),
                canvas,
                ctx,
            }
        }

        fn board_size(&self) -> (f32, f32) {
            (self.canvas.width() as f32, self.canvas.height() as f32)
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("Peer Duel starting...");

        let window = web_sys::window().expect("no window");
        let document = window.document().expect("no document");

        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .expect("no canvas")
            .dyn_into()
            .expect("not a canvas");
        canvas.set_width(canvas.client_width().max(1) as u32);
        canvas.set_height(canvas.client_height().max(1) as u32);

        let ctx: CanvasRenderingContext2d = canvas
            .get_context("2d")
            .expect("no 2d context")
            .expect("no 2d context")
            .dyn_into()
            .expect("not a 2d context");

        let app = Rc::new(RefCell::new(App::new(canvas, ctx)));
        log::info!("local peer id: {}", app.borrow().session.local_id());

        setup_connect_buttons(app.clone());
        setup_input_handlers(app.clone());
        request_animation_frame(app);

        log::info!("Peer Duel ready - pick host or join");
    }

    /// Execute every command the session has queued; async platform calls
    /// feed their completions back into the session and pump again
    fn pump(app: &Rc<RefCell<App>>) {
        loop {
            let commands = app.borrow_mut().session.drain_commands();
            if commands.is_empty() {
                return;
            }
            for command in commands {
                execute(app, command);
            }
        }
    }

    fn execute(app: &Rc<RefCell<App>>, command: Command) {
        match command {
            Command::OpenChannel => {
                let channel = {
                    let a = app.borrow();
                    let Some(pc) = a.pc.as_ref() else { return };
                    pc.create_data_channel("entities")
                };
                attach_channel(app, channel);
            }
            Command::CreateOffer => {
                let Some(pc) = app.borrow().pc.clone() else { return };
                let app = app.clone();
                spawn_local(async move {
                    match JsFuture::from(pc.create_offer()).await {
                        Ok(desc) => {
                            let Some(sdp) = description_sdp(&desc) else {
                                app.borrow_mut().session.fail("offer without sdp");
                                return;
                            };
                            let result = app
                                .borrow_mut()
                                .session
                                .offer_ready(SessionDescription::offer(sdp), now_ms());
                            if let Err(e) = result {
                                log::warn!("offer discarded: {e}");
                            }
                            pump(&app);
                        }
                        Err(e) => {
                            app.borrow_mut()
                                .session
                                .fail(&format!("createOffer rejected: {e:?}"));
                        }
                    }
                });
            }
            Command::CreateAnswer => {
                let Some(pc) = app.borrow().pc.clone() else { return };
                let app = app.clone();
                spawn_local(async move {
                    match JsFuture::from(pc.create_answer()).await {
                        Ok(desc) => {
                            let Some(sdp) = description_sdp(&desc) else {
                                app.borrow_mut().session.fail("answer without sdp");
                                return;
                            };
                            let result = app
                                .borrow_mut()
                                .session
                                .answer_ready(SessionDescription::answer(sdp));
                            if let Err(e) = result {
                                log::warn!("answer discarded: {e}");
                            }
                            pump(&app);
                        }
                        Err(e) => {
                            app.borrow_mut()
                                .session
                                .fail(&format!("createAnswer rejected: {e:?}"));
                        }
                    }
                });
            }
            Command::SetLocalDescription(desc) => {
                apply_description(app, desc, true);
            }
            Command::SetRemoteDescription(desc) => {
                apply_description(app, desc, false);
            }
            Command::AddCandidate(candidate) => {
                let Some(pc) = app.borrow().pc.clone() else { return };
                let init = RtcIceCandidateInit::new(&candidate.candidate);
                init.set_sdp_mid(candidate.sdp_mid.as_deref());
                init.set_sdp_m_line_index(candidate.sdp_m_line_index);
                let promise = pc.add_ice_candidate_with_opt_rtc_ice_candidate_init(Some(&init));
                spawn_local(async move {
                    // A rejected candidate is non-fatal; another path may work
                    if let Err(e) = JsFuture::from(promise).await {
                        log::warn!("candidate rejected: {e:?}");
                    }
                });
            }
            Command::SignalSend(env) => {
                send_signal(app, &env);
            }
        }
    }

    fn send_signal(app: &Rc<RefCell<App>>, env: &SignalEnvelope) {
        let a = app.borrow();
        let Some(ws) = a.ws.as_ref() else {
            log::debug!("relay not connected yet, dropping envelope");
            return;
        };
        if ws.ready_state() != WebSocket::OPEN {
            // The resend timer covers dropped offers
            log::debug!("relay socket not open, dropping envelope");
            return;
        }
        match serde_json::to_string(env) {
            Ok(json) => {
                if let Err(e) = ws.send_with_str(&json) {
                    log::warn!("relay send failed: {e:?}");
                }
            }
            Err(e) => log::warn!("envelope encode failed: {e}"),
        }
    }

    /// Apply an SDP to the platform connection. Local failures degrade;
    /// remote description failure is unrecoverable for this session.
    fn apply_description(app: &Rc<RefCell<App>>, desc: SessionDescription, local: bool) {
        let Some(pc) = app.borrow().pc.clone() else { return };
        let kind = match desc.kind.as_str() {
            "offer" => RtcSdpType::Offer,
            "answer" => RtcSdpType::Answer,
            other => {
                log::debug!("dropping description of unknown type {other:?}");
                return;
            }
        };
        let init = RtcSessionDescriptionInit::new(kind);
        init.set_sdp(&desc.sdp);
        let promise = if local {
            pc.set_local_description(&init)
        } else {
            pc.set_remote_description(&init)
        };
        let app = app.clone();
        spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                app.borrow_mut()
                    .session
                    .fail(&format!("description rejected: {e:?}"));
            }
        });
    }

    /// Pull the sdp string out of a created offer/answer value
    fn description_sdp(desc: &JsValue) -> Option<String> {
        js_sys::Reflect::get(desc, &JsValue::from_str("sdp"))
            .ok()?
            .as_string()
    }

    fn setup_connect_buttons(app: Rc<RefCell<App>>) {
        let document = web_sys::window().unwrap().document().unwrap();

        if let Some(btn) = document.get_element_by_id("host") {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: MouseEvent| {
                connect(&app, Role::Host);
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        if let Some(btn) = document.get_element_by_id("join") {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: MouseEvent| {
                connect(&app, Role::Guest);
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    /// User picked a side: bring up the relay socket and peer connection and
    /// kick the session out of `Idle`
    fn connect(app: &Rc<RefCell<App>>, role: Role) {
        {
            let a = app.borrow();
            if a.pc.is_some() {
                log::warn!("already connecting");
                return;
            }
        }

        let pc = match create_peer_connection(app) {
            Ok(pc) => pc,
            Err(e) => {
                app.borrow_mut()
                    .session
                    .fail(&format!("peer connection: {e:?}"));
                return;
            }
        };
        let ws = match open_relay_socket(app) {
            Ok(ws) => ws,
            Err(e) => {
                app.borrow_mut().session.fail(&format!("relay: {e:?}"));
                return;
            }
        };

        {
            let mut a = app.borrow_mut();
            a.pc = Some(pc);
            a.ws = Some(ws);
            a.local = LocalInput::for_player(match role {
                Role::Host => PlayerId::Host,
                Role::Guest => PlayerId::Guest,
            });
            let result = match role {
                Role::Host => a.session.open_as_host(),
                Role::Guest => a.session.open_as_guest(),
            };
            if let Err(e) = result {
                log::warn!("connect ignored: {e}");
                return;
            }
            log::info!("connecting as {role:?}");
        }
        pump(app);
    }

    fn create_peer_connection(app: &Rc<RefCell<App>>) -> Result<RtcPeerConnection, JsValue> {
        let rtc_config = RtcConfiguration::new();
        let servers = js_sys::Array::new();
        for url in &app.borrow().config.ice_servers {
            let server = RtcIceServer::new();
            server.set_urls(&JsValue::from_str(url));
            servers.push(&server);
        }
        rtc_config.set_ice_servers(&servers);
        let pc = RtcPeerConnection::new_with_configuration(&rtc_config)?;

        // Locally gathered candidates go to the peer via the relay
        {
            let app = app.clone();
            let closure =
                Closure::<dyn FnMut(_)>::new(move |event: RtcPeerConnectionIceEvent| {
                    if let Some(candidate) = event.candidate() {
                        let descriptor = CandidateDescriptor {
                            candidate: candidate.candidate(),
                            sdp_mid: candidate.sdp_mid(),
                            sdp_m_line_index: candidate.sdp_m_line_index(),
                        };
                        app.borrow_mut().session.local_candidate(descriptor);
                        pump(&app);
                    }
                });
            pc.set_onicecandidate(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        // Answerer side: the channel arrives from the offerer
        {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: RtcDataChannelEvent| {
                log::info!("data channel received from peer");
                attach_channel(&app, event.channel());
            });
            pc.set_ondatachannel(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        {
            let pc_state = pc.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                log::info!("ice connection state: {:?}", pc_state.ice_connection_state());
            });
            pc.set_oniceconnectionstatechange(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        Ok(pc)
    }

    fn open_relay_socket(app: &Rc<RefCell<App>>) -> Result<WebSocket, JsValue> {
        let ws = WebSocket::new(&app.borrow().config.relay_url)?;

        {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                log::info!("relay connected, announcing presence");
                app.borrow_mut().session.announce();
                pump(&app);
            });
            ws.set_onopen(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: MessageEvent| {
                let Some(raw) = event.data().as_string() else {
                    return;
                };
                match serde_json::from_str::<SignalEnvelope>(&raw) {
                    Ok(env) => {
                        app.borrow_mut().session.handle_signal(&env, now_ms());
                        pump(&app);
                    }
                    // Malformed relay traffic is dropped, not fatal
                    Err(e) => log::debug!("dropping malformed relay message: {e}"),
                }
            });
            ws.set_onmessage(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                log::warn!("relay socket error");
            });
            ws.set_onerror(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        Ok(ws)
    }

    fn attach_channel(app: &Rc<RefCell<App>>, channel: RtcDataChannel) {
        {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                app.borrow_mut().session.channel_open();
                start_game(&app);
                pump(&app);
            });
            channel.set_onopen(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: MessageEvent| {
                let Some(raw) = event.data().as_string() else {
                    return;
                };
                match ChannelMsg::decode(&raw) {
                    Ok(ChannelMsg::Snapshot(entities)) => {
                        if let Some(game) = app.borrow_mut().game.as_mut() {
                            game.apply_snapshot(entities);
                        }
                    }
                    Ok(ChannelMsg::Input(frame)) => {
                        app.borrow_mut()
                            .remote
                            .push_frame(frame.keys(), frame.click);
                    }
                    Err(e) => log::debug!("dropping malformed channel message: {e}"),
                }
            });
            channel.set_onmessage(Some(closure.as_ref().unchecked_ref()));
            closure.forget();
        }

        app.borrow_mut().channel = Some(channel);
    }

    /// Negotiation finished: build the board and start ticking
    fn start_game(app: &Rc<RefCell<App>>) {
        let mut a = app.borrow_mut();
        if a.game.is_some() {
            return;
        }
        let Some(role) = a.session.role() else { return };
        // The role may have flipped since the connect button (glare yield);
        // retag the local input so outgoing clicks carry the right owner,
        // dropping anything buffered under the old identity
        let player = match role {
            Role::Host => PlayerId::Host,
            Role::Guest => PlayerId::Guest,
        };
        if a.local.player != Some(player) {
            a.local = LocalInput::for_player(player);
        }
        let (w, h) = a.board_size();
        let board = match role {
            // Seed from the clock; the guest never simulates, so the seed
            // doesn't need to be shared
            Role::Host => Board::new(w, h, js_sys::Date::now() as u64),
            Role::Guest => Board::empty(w, h),
        };
        let min_interval = a.config.min_frame_interval_ms;
        a.game = Some(FrameLoop::new(board, role, min_interval));
        log::info!("game started as {role:?} on {w}x{h}");
    }

    fn setup_input_handlers(app: Rc<RefCell<App>>) {
        let window = web_sys::window().unwrap();
        let document = window.document().unwrap();

        {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                app.borrow_mut().local.keys.press_code(event.key_code());
            });
            let _ = window
                .add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        {
            let app = app.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                app.borrow_mut().local.keys.release_code(event.key_code());
            });
            let _ = window
                .add_event_listener_with_callback("keyup", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Clicks are captured in simulation space: canvas-relative, Y flipped
        {
            let canvas = document
                .get_element_by_id("canvas")
                .and_then(|e| e.dyn_into::<web_sys::HtmlCanvasElement>().ok());
            if let Some(canvas) = canvas {
                let closure = Closure::<dyn FnMut(_)>::new(move |event: MouseEvent| {
                    let mut a = app.borrow_mut();
                    let height = a.canvas.height() as f32;
                    let x = event.offset_x() as f32;
                    let y = height - event.offset_y() as f32;
                    a.local.click(x, y);
                });
                let _ = canvas
                    .add_event_listener_with_callback("mousedown", closure.as_ref().unchecked_ref());
                closure.forget();
            }
        }
    }

    fn request_animation_frame(app: Rc<RefCell<App>>) {
        let window = web_sys::window().unwrap();
        let closure = Closure::once(move |_time: f64| {
            game_loop(app);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(app: Rc<RefCell<App>>) {
        {
            let mut guard = app.borrow_mut();
            let a = &mut *guard;
            a.session.poll_resend(now_ms());

            if let Some(game) = a.game.as_mut() {
                let output = game.frame(now_ms(), &mut a.local, &mut a.remote);
                if let (Some(output), Some(channel)) = (output, a.channel.as_ref()) {
                    let encoded = match output {
                        FrameOutput::Snapshot(entities) => {
                            ChannelMsg::Snapshot(entities).encode()
                        }
                        FrameOutput::Input(frame) => ChannelMsg::Input(frame).encode(),
                    };
                    match encoded {
                        Ok(json) => {
                            if let Err(e) = channel.send_with_str(&json) {
                                log::warn!("channel send failed: {e:?}");
                            }
                        }
                        Err(e) => log::warn!("channel encode failed: {e}"),
                    }
                }
                render(&a.ctx, game.board());
            }
        }

        pump(&app);
        request_animation_frame(app);
    }

    /// Render collaborator: filled circles, Y axis flipped versus simulation
    fn render(ctx: &CanvasRenderingContext2d, board: &Board) {
        ctx.clear_rect(0.0, 0.0, board.width as f64, board.height as f64);
        for e in &board.entities {
            ctx.begin_path();
            let _ = ctx.arc(
                e.x as f64,
                (board.height - e.y) as f64,
                e.r as f64,
                0.0,
                std::f64::consts::TAU,
            );
            ctx.set_fill_style_str(&e.color);
            ctx.fill();
            ctx.set_stroke_style_str("black");
            ctx.stroke();
            ctx.close_path();
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_game::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Peer Duel (native) starting...");
    log::info!("The game targets the browser - run with `trunk serve` for the web version");
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
