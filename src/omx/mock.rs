//! Scriptable component library for harness tests.
//!
//! Commands complete instantly: every accepted `send_command` emits its
//! `CmdComplete` back through the component's sink, a codec-parameter change
//! answers with a port-settings event the way a real decoder derives its
//! output settings, and (when enabled) a fully executing pipeline raises EOS
//! from its renderer. Waits are condition-variable based so tests can hold
//! still until the pipeline reaches a state.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::omx::{
    BufferSupplier, CommandComplete, ComponentId, EventSink, OmxCommand, OmxCore, OmxError,
    OmxState, RawEvent,
};
use crate::probe::{
    AudioCoding, CodecParams, MediaProbe, PcmParams, PortDomain, StreamInfo, TrackMetadata,
};

const WAIT_DEADLINE: Duration = Duration::from_secs(5);

struct MockComponent {
    id: ComponentId,
    name: String,
    sink: Arc<dyn EventSink>,
    state: OmxState,
    alive: bool,
    codec: CodecParams,
    volume: i32,
    mute: bool,
    disabled_ports: Vec<u32>,
}

#[derive(Default)]
struct MockState {
    components: Vec<MockComponent>,
    next_id: u32,
    content_uris: Vec<String>,
    exec_entries: HashMap<String, u32>,
    fail_instantiation: HashMap<String, OmxError>,
    auto_eos: bool,
    init_calls: u32,
    deinit_calls: u32,
}

pub(crate) struct MockCore {
    state: Mutex<MockState>,
    cv: Condvar,
}

impl MockCore {
    pub(crate) fn new() -> MockCore {
        MockCore {
            state: Mutex::new(MockState::default()),
            cv: Condvar::new(),
        }
    }

    /// Raise EOS from the renderer once every live component is executing.
    pub(crate) fn set_auto_eos(&self, auto_eos: bool) {
        self.state.lock().unwrap().auto_eos = auto_eos;
    }

    /// Make instantiation (and verification) of a component name fail.
    pub(crate) fn fail_instantiation(&self, name: &str, error: OmxError) {
        self.state
            .lock()
            .unwrap()
            .fail_instantiation
            .insert(name.to_string(), error);
    }

    /// Raises EOS from the newest live component with this name.
    pub(crate) fn emit_eos(&self, name: &str) {
        let (id, sink) = {
            let state = self.state.lock().unwrap();
            let component = latest_alive(&state, name).expect("no such live component");
            (component.id, component.sink.clone())
        };
        sink.deliver(RawEvent::BufferFlag {
            component: id,
            port: 0,
            flags: 1,
        });
    }

    /// Raises an asynchronous error from the newest live component with
    /// this name.
    pub(crate) fn emit_error(&self, name: &str, error: OmxError) {
        let (id, sink) = {
            let state = self.state.lock().unwrap();
            let component = latest_alive(&state, name).expect("no such live component");
            (component.id, component.sink.clone())
        };
        sink.deliver(RawEvent::Error {
            component: id,
            error,
            port: None,
        });
    }

    pub(crate) fn content_uris(&self) -> Vec<String> {
        self.state.lock().unwrap().content_uris.clone()
    }

    pub(crate) fn live_components(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .components
            .iter()
            .filter(|c| c.alive)
            .count()
    }

    pub(crate) fn instantiated_total(&self) -> usize {
        self.state.lock().unwrap().components.len()
    }

    pub(crate) fn instantiated_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .components
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Ports the newest live component with this name has disabled.
    pub(crate) fn disabled_ports(&self, name: &str) -> Vec<u32> {
        let state = self.state.lock().unwrap();
        latest_alive(&state, name)
            .map(|c| c.disabled_ports.clone())
            .unwrap_or_default()
    }

    pub(crate) fn init_calls(&self) -> u32 {
        self.state.lock().unwrap().init_calls
    }

    pub(crate) fn deinit_calls(&self) -> u32 {
        self.state.lock().unwrap().deinit_calls
    }

    /// Blocks until the named component has entered Executing `count` times
    /// over the whole test (instances of the same name accumulate) and the
    /// whole pipeline is running. Events raised after this wait are ordered
    /// behind the batch's completion events.
    pub(crate) fn wait_executing(&self, name: &str, count: u32) {
        self.wait_for(|state| {
            let entries = state.exec_entries.get(name).copied().unwrap_or(0);
            let alive: Vec<&MockComponent> =
                state.components.iter().filter(|c| c.alive).collect();
            entries >= count
                && !alive.is_empty()
                && alive.iter().all(|c| c.state == OmxState::Executing)
        })
        .unwrap_or_else(|| panic!("timed out waiting for {} execution #{}", name, count));
    }

    /// Blocks until the newest live component with this name sits in
    /// `target`.
    pub(crate) fn wait_state(&self, name: &str, target: OmxState) {
        self.wait_for(|state| {
            latest_alive(state, name).map(|c| c.state) == Some(target)
        })
        .unwrap_or_else(|| panic!("timed out waiting for {} to reach {}", name, target));
    }

    pub(crate) fn wait_volume(&self, name: &str, target: i32) {
        self.wait_for(|state| {
            latest_alive(state, name).map(|c| c.volume) == Some(target)
        })
        .unwrap_or_else(|| panic!("timed out waiting for {} volume {}", name, target));
    }

    fn wait_for(&self, predicate: impl Fn(&MockState) -> bool) -> Option<()> {
        let deadline = Instant::now() + WAIT_DEADLINE;
        let mut state = self.state.lock().unwrap();
        while !predicate(&state) {
            let left = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = self.cv.wait_timeout(state, left).unwrap();
            state = guard;
        }
        Some(())
    }

    fn component<'a>(
        state: &'a mut MutexGuard<'_, MockState>,
        id: ComponentId,
    ) -> Result<&'a mut MockComponent, OmxError> {
        state
            .components
            .iter_mut()
            .find(|c| c.id == id && c.alive)
            .ok_or(OmxError::BadParameter)
    }
}

fn latest_alive<'a>(state: &'a MockState, name: &str) -> Option<&'a MockComponent> {
    state
        .components
        .iter()
        .rev()
        .find(|c| c.alive && c.name == name)
}

impl OmxCore for MockCore {
    fn init(&self) -> Result<(), OmxError> {
        self.state.lock().unwrap().init_calls += 1;
        Ok(())
    }

    fn deinit(&self) {
        self.state.lock().unwrap().deinit_calls += 1;
    }

    fn verify_component(&self, name: &str) -> Result<(), OmxError> {
        match self.state.lock().unwrap().fail_instantiation.get(name) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn verify_role(&self, _name: &str, _role: &str) -> Result<(), OmxError> {
        Ok(())
    }

    fn instantiate(&self, name: &str, sink: Arc<dyn EventSink>) -> Result<ComponentId, OmxError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_instantiation.get(name) {
            return Err(error.clone());
        }
        state.next_id += 1;
        let id = ComponentId(state.next_id);
        state.components.push(MockComponent {
            id,
            name: name.to_string(),
            sink,
            state: OmxState::Loaded,
            alive: true,
            codec: CodecParams::default(),
            volume: 80,
            mute: false,
            disabled_ports: Vec::new(),
        });
        self.cv.notify_all();
        Ok(id)
    }

    fn free(&self, component: ComponentId) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, component)?.alive = false;
        self.cv.notify_all();
        Ok(())
    }

    fn set_role(&self, component: ComponentId, _role: &str) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, component)?;
        Ok(())
    }

    fn set_buffer_supplier(
        &self,
        component: ComponentId,
        _port: u32,
        _supplier: BufferSupplier,
    ) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, component)?;
        Ok(())
    }

    fn setup_tunnel(
        &self,
        out_component: ComponentId,
        _out_port: u32,
        in_component: ComponentId,
        _in_port: u32,
    ) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, out_component)?;
        MockCore::component(&mut state, in_component)?;
        Ok(())
    }

    fn tear_down_tunnel(
        &self,
        out_component: ComponentId,
        _out_port: u32,
        in_component: ComponentId,
        _in_port: u32,
    ) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, out_component)?;
        MockCore::component(&mut state, in_component)?;
        Ok(())
    }

    fn send_command(&self, component: ComponentId, command: OmxCommand) -> Result<(), OmxError> {
        let sink = {
            let mut state = self.state.lock().unwrap();
            MockCore::component(&mut state, component)?.sink.clone()
        };
        let completion = match command {
            OmxCommand::StateSet(to) => CommandComplete::StateSet(to),
            OmxCommand::PortDisable(port) => CommandComplete::PortDisable(port),
            OmxCommand::PortEnable(port) => CommandComplete::PortEnable(port),
            OmxCommand::Flush(port) => CommandComplete::Flush(port),
        };
        // Deliver first, record the transition after: a waiter can only see
        // the new state once the completion is already in the queue, so
        // events a test raises after its wait are ordered behind it.
        sink.deliver(RawEvent::CmdComplete {
            component,
            command: completion,
            error: None,
        });

        let eos_sink = {
            let mut state = self.state.lock().unwrap();
            match command {
                OmxCommand::StateSet(to) => {
                    let name = {
                        let target = MockCore::component(&mut state, component)?;
                        target.state = to;
                        target.name.clone()
                    };
                    if to == OmxState::Executing {
                        *state.exec_entries.entry(name).or_insert(0) += 1;
                    }
                }
                OmxCommand::PortDisable(port) => {
                    MockCore::component(&mut state, component)?
                        .disabled_ports
                        .push(port);
                }
                OmxCommand::PortEnable(port) => {
                    MockCore::component(&mut state, component)?
                        .disabled_ports
                        .retain(|p| *p != port);
                }
                OmxCommand::Flush(_) => {}
            }
            // The renderer signals EOS once the whole pipeline is running.
            let alive: Vec<&MockComponent> =
                state.components.iter().filter(|c| c.alive).collect();
            let all_executing =
                !alive.is_empty() && alive.iter().all(|c| c.state == OmxState::Executing);
            if state.auto_eos && all_executing && matches!(command, OmxCommand::StateSet(_)) {
                alive
                    .iter()
                    .find(|c| c.name.contains("renderer"))
                    .map(|c| (c.id, c.sink.clone()))
            } else {
                None
            }
        };
        if let Some((renderer, renderer_sink)) = eos_sink {
            renderer_sink.deliver(RawEvent::BufferFlag {
                component: renderer,
                port: 0,
                flags: 1,
            });
        }
        self.cv.notify_all();
        Ok(())
    }

    fn set_content_uri(&self, component: ComponentId, uri: &str) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, component)?;
        state.content_uris.push(uri.to_string());
        Ok(())
    }

    fn get_codec_params(
        &self,
        component: ComponentId,
        _port: u32,
    ) -> Result<CodecParams, OmxError> {
        let mut state = self.state.lock().unwrap();
        Ok(MockCore::component(&mut state, component)?.codec.clone())
    }

    fn set_codec_params(
        &self,
        component: ComponentId,
        _port: u32,
        params: &CodecParams,
    ) -> Result<(), OmxError> {
        let changed_sink = {
            let mut state = self.state.lock().unwrap();
            let target = MockCore::component(&mut state, component)?;
            let changed = target.codec.sampling_rate != params.sampling_rate
                || target.codec.channels != params.channels;
            target.codec = params.clone();
            changed.then(|| target.sink.clone())
        };
        // A decoder whose input settings changed re-derives its output port
        // settings.
        if let Some(sink) = changed_sink {
            sink.deliver(RawEvent::PortSettingsChanged {
                component,
                port: 1,
                index: 0,
            });
        }
        Ok(())
    }

    fn set_pcm_params(
        &self,
        component: ComponentId,
        _port: u32,
        _params: &PcmParams,
    ) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, component)?;
        Ok(())
    }

    fn get_volume(&self, component: ComponentId, _port: u32) -> Result<i32, OmxError> {
        let mut state = self.state.lock().unwrap();
        Ok(MockCore::component(&mut state, component)?.volume)
    }

    fn set_volume(&self, component: ComponentId, _port: u32, volume: i32) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, component)?.volume = volume;
        drop(state);
        self.cv.notify_all();
        Ok(())
    }

    fn get_mute(&self, component: ComponentId, _port: u32) -> Result<bool, OmxError> {
        let mut state = self.state.lock().unwrap();
        Ok(MockCore::component(&mut state, component)?.mute)
    }

    fn set_mute(&self, component: ComponentId, _port: u32, mute: bool) -> Result<(), OmxError> {
        let mut state = self.state.lock().unwrap();
        MockCore::component(&mut state, component)?.mute = mute;
        drop(state);
        self.cv.notify_all();
        Ok(())
    }
}

/// Extension-driven probe with scriptable failures.
pub(crate) struct MockProbe {
    failures: Mutex<HashMap<String, OmxError>>,
    codec: CodecParams,
}

impl MockProbe {
    pub(crate) fn new() -> MockProbe {
        MockProbe {
            failures: Mutex::new(HashMap::new()),
            codec: CodecParams {
                channels: 2,
                sampling_rate: 44100,
                bit_rate: 128_000,
            },
        }
    }

    pub(crate) fn fail(&self, uri: &str, error: OmxError) {
        self.failures
            .lock()
            .unwrap()
            .insert(uri.to_string(), error);
    }
}

impl MediaProbe for MockProbe {
    fn probe(&self, uri: &str) -> Result<StreamInfo, OmxError> {
        if let Some(error) = self.failures.lock().unwrap().get(uri) {
            return Err(error.clone());
        }
        let coding = match crate::probe::uri_extension(uri).as_str() {
            "mp3" => AudioCoding::Mp3,
            "flac" => AudioCoding::Flac,
            "opus" => AudioCoding::Opus,
            "ogg" | "oga" => AudioCoding::Vorbis,
            _ => return Err(OmxError::FormatNotDetected),
        };
        let mut metadata = TrackMetadata::new();
        metadata.insert("trackid".to_string(), "1".to_string());
        Ok(StreamInfo {
            domain: PortDomain::Audio,
            coding,
            metadata,
            pcm: PcmParams::default(),
            codec: self.codec.clone(),
        })
    }
}
