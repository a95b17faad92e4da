//! Module session - owns the type selection and orchestrates
//! detection, page reads, writes and decoding over one coding box link.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::checksum::{ChecksumRule, ChecksumStatus};
use crate::decoder::{self, ModuleInfo};
use crate::detector::{Detection, Detector};
use crate::diagnostics::{self, Diagnostics};
use crate::dump::hex_dump;
use crate::events::{
    EventLog, LogEntry, LogLevel, SessionPhase, TracingObserver, XcvrEvent, XcvrObserver,
};
use crate::memory::{self, ChecksumResult, MemoryPage, PageId, ReadError, WriteResult};
use crate::module_type::ModuleType;
use crate::protocol::constants::{
    CODING_BOX_PRODUCT_ID, CODING_BOX_VENDOR_ID, DEFAULT_RESPONSE_TIMEOUT_MS, REBOOT_SETTLE_MS,
};
use crate::protocol::{CommandBuilder, CommandSet, ProtocolContext};
use crate::transport::Transport;

/// Configuration for a module session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Selection before the first detection.
    pub default_module: ModuleType,
    /// Bound on each receive.
    pub response_timeout_ms: u64,
    /// Wait after the reboot command before reading back.
    pub settle_ms: u64,
    /// Read A2 after A0 when the module implements DDM.
    pub read_diagnostics: bool,
    /// Adopt a detected type that differs from the selection.
    pub auto_adopt: bool,
    /// Rule page checksums are evaluated with.
    pub checksum_rule: ChecksumRule,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Command templates.
    pub commands: CommandSet,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_module: ModuleType::default(),
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            settle_ms: REBOOT_SETTLE_MS,
            read_diagnostics: true,
            auto_adopt: true,
            checksum_rule: ChecksumRule::default(),
            vendor_id: CODING_BOX_VENDOR_ID,
            product_id: CODING_BOX_PRODUCT_ID,
            commands: CommandSet::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        config.commands.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// State owned by the session controller.
#[derive(Debug, Clone)]
pub struct SessionState {
    selected: ModuleType,
    phase: SessionPhase,
    last_detection: Option<Detection>,
    log: EventLog,
}

impl SessionState {
    fn new(selected: ModuleType) -> Self {
        Self {
            selected,
            phase: SessionPhase::Idle,
            last_detection: None,
            log: EventLog::new(),
        }
    }

    pub fn selected(&self) -> ModuleType {
        self.selected
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn last_detection(&self) -> Option<&Detection> {
        self.last_detection.as_ref()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }
}

/// Everything one module read produced.
#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub module: ModuleType,
    pub info: ModuleInfo,
    pub a0: MemoryPage,
    pub a2: Option<MemoryPage>,
    pub diagnostics: Option<Diagnostics>,
}

impl ModuleReport {
    /// Checksum results of every page read, A0 first.
    pub fn checksums(&self) -> Vec<ChecksumResult> {
        self.a0
            .checksums
            .iter()
            .chain(self.a2.iter().flat_map(|p| p.checksums.iter()))
            .copied()
            .collect()
    }

    pub fn checksums_ok(&self) -> bool {
        self.checksums().iter().all(|c| c.status.is_pass())
    }
}

/// Module session - the only owner of the type selection.
///
/// Operations run strictly one after another over the link; the state is
/// updated only between protocol steps.
pub struct ModuleSession<T: Transport, O: XcvrObserver = TracingObserver> {
    transport: T,
    observer: Arc<O>,
    builder: Box<dyn CommandBuilder>,
    config: SessionConfig,
    state: SessionState,
}

impl<T: Transport> ModuleSession<T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: Transport, O: XcvrObserver> ModuleSession<T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(transport: T, config: SessionConfig, observer: Arc<O>) -> Self {
        let mut session = Self {
            builder: Box::new(config.commands.clone()),
            state: SessionState::new(config.default_module),
            transport,
            observer,
            config,
        };
        if session.transport.is_connected() {
            session.emit(XcvrEvent::DeviceConnected {
                vid: session.transport.vendor_id(),
                pid: session.transport.product_id(),
            });
        }
        session
    }

    /// Replace the command tables from the config with another builder.
    pub fn with_builder(mut self, builder: impl CommandBuilder + 'static) -> Self {
        self.builder = Box::new(builder);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn selected_module(&self) -> ModuleType {
        self.state.selected
    }

    /// Ordered, timestamped record of everything the session did.
    pub fn event_log(&self) -> &EventLog {
        &self.state.log
    }

    fn emit(&mut self, event: XcvrEvent) {
        self.observer.on_event(&event);
        self.state.log.push(LogEntry::from_event(&event));
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.emit(XcvrEvent::Log {
            level,
            message: message.into(),
        });
    }

    fn goto_phase(&mut self, to: SessionPhase) {
        let from = self.state.phase;
        if from != to {
            self.state.phase = to;
            self.emit(XcvrEvent::PhaseChanged { from, to });
        }
    }

    /// Run one protocol step and commit its log entries afterwards.
    fn step<R>(&mut self, f: impl FnOnce(&mut ProtocolContext<'_, T, O>) -> R) -> R {
        let timeout = self.config.response_timeout();
        let mut ctx = ProtocolContext::new(
            &self.transport,
            self.builder.as_ref(),
            self.observer.as_ref(),
            timeout,
        )
        .with_checksum_rule(self.config.checksum_rule);
        let result = f(&mut ctx);
        let entries = ctx.into_entries();
        self.state.log.extend(entries);
        result
    }

    fn change_selection(&mut self, to: ModuleType, automatic: bool) {
        let from = self.state.selected;
        if from == to {
            return;
        }
        self.state.selected = to;
        self.emit(XcvrEvent::SelectionChanged {
            from,
            to,
            automatic,
        });
    }

    /// Explicit selection by the operator.
    pub fn select_module(&mut self, module: ModuleType) {
        self.change_selection(module, false);
    }

    /// Detect the plugged module and apply the adoption policy.
    ///
    /// An inconclusive detection leaves the selection as it was.
    #[instrument(skip(self))]
    pub fn detect_and_select(&mut self) -> Detection {
        self.goto_phase(SessionPhase::Detecting);
        let detection = self.step(|ctx| Detector::new().detect(ctx));

        match detection.module() {
            Some(module) if module == self.state.selected => {}
            Some(module) if self.config.auto_adopt => self.change_selection(module, true),
            Some(module) => {
                let selected = self.state.selected;
                self.log(
                    LogLevel::Warn,
                    format!("Detected {module}, keeping selected {selected}"),
                );
            }
            None => {
                let selected = self.state.selected;
                warn!(selected = %selected, "Detection inconclusive, keeping selection");
                self.log(
                    LogLevel::Warn,
                    format!("Detection failed ({detection}), keeping {selected}"),
                );
            }
        }

        self.state.last_detection = Some(detection.clone());
        self.goto_phase(SessionPhase::Idle);
        detection
    }

    /// Detect, then read and decode the module with the resulting selection.
    #[instrument(skip(self))]
    pub fn read_module(&mut self) -> Result<ModuleReport, ReadError> {
        self.detect_and_select();
        self.read_selected()
    }

    /// Select `module` explicitly, then read and decode without detection.
    pub fn read_module_as(&mut self, module: ModuleType) -> Result<ModuleReport, ReadError> {
        self.select_module(module);
        self.read_selected()
    }

    fn read_selected(&mut self) -> Result<ModuleReport, ReadError> {
        let module = self.state.selected;
        let read_diagnostics = self.config.read_diagnostics;
        self.goto_phase(SessionPhase::Reading);

        let result = self.step(|ctx| -> Result<ModuleReport, ReadError> {
            let a0 = memory::read_page(ctx, module, PageId::A0)?;
            ctx.log(LogLevel::Debug, format!("A0 data:\n{}", hex_dump(a0.received_bytes())));
            let info = decoder::decode(module, &a0.data);

            let a2 = if read_diagnostics && info.supports_ddm {
                Some(memory::read_page(ctx, module, PageId::A2)?)
            } else {
                None
            };
            let diagnostics = a2.as_ref().map(|p| diagnostics::decode(&p.data));

            Ok(ModuleReport {
                module,
                info,
                a0,
                a2,
                diagnostics,
            })
        });

        match &result {
            Ok(report) => {
                info!(
                    module = %module,
                    vendor = %report.info.vendor,
                    part = %report.info.part_number,
                    checksums_ok = report.checksums_ok(),
                    "Module read"
                );
                self.emit(XcvrEvent::Complete);
                self.goto_phase(SessionPhase::Complete);
            }
            Err(e) => self.fail(e.to_string()),
        }
        result
    }

    /// Read one page with the current selection, without detection.
    pub fn read_page(&mut self, page: PageId) -> Result<MemoryPage, ReadError> {
        let module = self.state.selected;
        self.goto_phase(SessionPhase::Reading);
        let result = self.step(|ctx| memory::read_page(ctx, module, page));
        match &result {
            Ok(_) => self.goto_phase(SessionPhase::Complete),
            Err(e) => self.fail(e.to_string()),
        }
        result
    }

    /// Detect, then write one byte, reboot the module and verify it.
    #[instrument(skip(self))]
    pub fn write_byte(&mut self, address: u8, offset: u8, value: u8) -> WriteResult {
        self.detect_and_select();
        self.write_selected(address, offset, value)
    }

    /// Select `module` explicitly, then write without detection.
    pub fn write_byte_as(
        &mut self,
        module: ModuleType,
        address: u8,
        offset: u8,
        value: u8,
    ) -> WriteResult {
        self.select_module(module);
        self.write_selected(address, offset, value)
    }

    fn write_selected(&mut self, address: u8, offset: u8, value: u8) -> WriteResult {
        let module = self.state.selected;
        let settle = self.config.settle();
        self.goto_phase(SessionPhase::Writing);

        let result =
            self.step(|ctx| memory::write_byte(ctx, module, address, offset, value, settle));

        match &result {
            WriteResult::Verified { .. } => {
                self.emit(XcvrEvent::Complete);
                self.goto_phase(SessionPhase::Complete);
            }
            WriteResult::VerificationFailed { .. } => self.goto_phase(SessionPhase::Error),
            WriteResult::WriteError { .. } => self.fail(result.to_string()),
        }
        result
    }

    /// Decode a dump supplied by the front end with the current selection.
    pub fn decode_buffer(&self, buffer: &[u8]) -> (ModuleInfo, Vec<ChecksumResult>) {
        decode_buffer(self.state.selected, buffer, self.config.checksum_rule)
    }

    fn fail(&mut self, message: String) {
        self.emit(XcvrEvent::Error { message });
        self.goto_phase(SessionPhase::Error);
    }
}

/// Decode an A0 dump as `module` and evaluate its checksums with `rule`. No I/O.
pub fn decode_buffer(
    module: ModuleType,
    buffer: &[u8],
    rule: ChecksumRule,
) -> (ModuleInfo, Vec<ChecksumResult>) {
    let checksums = module
        .descriptor()
        .page(PageId::A0)
        .map(|layout| {
            layout
                .checksums
                .iter()
                .map(|region| ChecksumResult::evaluate(PageId::A0, region, rule, buffer))
                .collect()
        })
        .unwrap_or_default();
    (decoder::decode(module, buffer), checksums)
}

/// True if any result is a definite failure.
pub fn any_checksum_failed(results: &[ChecksumResult]) -> bool {
    results.iter().any(|c| c.status == ChecksumStatus::Fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::UnidentifiedReason;
    use crate::events::NullObserver;
    use crate::fixtures::{CAPTURED_SFP_A0, captured_sfp_page, zero_sum_sfp_page};
    use crate::transport::MockTransport;

    fn config() -> SessionConfig {
        let mut config = SessionConfig {
            response_timeout_ms: 10,
            settle_ms: 0,
            ..SessionConfig::default()
        };
        config.commands.generic.write = Some("23 00 02 %a %o %v".into());
        config.commands.generic.reboot = Some("23 00 05".into());
        config
    }

    fn session(mock: &MockTransport, config: SessionConfig) -> ModuleSession<MockTransport, NullObserver> {
        ModuleSession::with_observer(mock.clone(), config, Arc::new(NullObserver))
    }

    fn a2_page() -> Vec<u8> {
        let mut a2 = vec![0u8; 128];
        a2[96..98].copy_from_slice(&0x1980u16.to_be_bytes());
        a2
    }

    #[test]
    fn test_detect_adopts_new_type() {
        let mock = MockTransport::new();
        mock.queue_byte(0x03);
        let mut s = session(
            &mock,
            SessionConfig {
                default_module: ModuleType::Qsfp,
                ..config()
            },
        );

        let detection = s.detect_and_select();
        assert_eq!(detection.module(), Some(ModuleType::Sfp));
        assert_eq!(s.selected_module(), ModuleType::Sfp);
        assert_eq!(s.state().last_detection(), Some(&detection));
        assert!(s.event_log().contains("Module type changed from QSFP to SFP"));
    }

    #[test]
    fn test_detect_without_auto_adopt_keeps_selection() {
        let mock = MockTransport::new();
        mock.queue_byte(0x0C);
        let mut s = session(
            &mock,
            SessionConfig {
                auto_adopt: false,
                ..config()
            },
        );

        assert_eq!(s.detect_and_select().module(), Some(ModuleType::Qsfp));
        assert_eq!(s.selected_module(), ModuleType::Sfp);
        assert!(s.event_log().contains("keeping selected SFP"));
    }

    #[test]
    fn test_unknown_identifier_keeps_selection() {
        let mock = MockTransport::new();
        mock.queue_byte(0x7E);
        let mut s = session(&mock, config());
        s.select_module(ModuleType::Xfp);

        let detection = s.detect_and_select();
        assert!(matches!(
            detection,
            Detection::Unidentified {
                reason: UnidentifiedReason::UnknownIdentifier,
                ..
            }
        ));
        assert_eq!(s.selected_module(), ModuleType::Xfp);
        assert!(s.event_log().contains("keeping XFP"));
    }

    #[test]
    fn test_timeout_leaves_selection_unchanged() {
        let mock = MockTransport::new();
        let mut s = session(
            &mock,
            SessionConfig {
                default_module: ModuleType::SfpPlus,
                ..config()
            },
        );

        let err = s.read_module().unwrap_err();
        assert!(err.source.is_timeout());
        assert!(s.state().last_detection().is_some_and(Detection::is_timeout));
        assert_eq!(s.selected_module(), ModuleType::SfpPlus);
        assert_eq!(s.state().phase(), SessionPhase::Error);
    }

    #[test]
    fn test_read_module_with_diagnostics() {
        let mock = MockTransport::new();
        mock.queue_byte(0x03);
        mock.queue_response(&zero_sum_sfp_page());
        mock.queue_response(&a2_page());
        let mut s = session(&mock, config());

        let report = s.read_module().unwrap();
        assert_eq!(report.module, ModuleType::Sfp);
        assert_eq!(report.info.vendor, "OEM");
        assert_eq!(report.info.part_number, "NX-SF-3G1-20");
        assert!(report.a0.checksums_ok());
        assert_eq!(report.checksums().len(), 3);
        assert_eq!(report.diagnostics.and_then(|d| d.temperature_c), Some(25.5));
        assert_eq!(mock.get_sends().len(), 3);
        assert_eq!(mock.get_sends()[2][3], 0xA2);

        let log = s.event_log();
        assert!(log.contains("SFP module detected"));
        assert!(log.contains("A0 63 CheckSum OK!"));
        assert!(log.contains("A0 95 CheckSum OK!"));
        assert!(log.contains("SFP-A0 Reading Code End"));
        assert_eq!(s.state().phase(), SessionPhase::Complete);
    }

    #[test]
    fn test_sff_checksum_rule_from_config() {
        let mock = MockTransport::new();
        mock.queue_response(&captured_sfp_page());
        let mut s = session(
            &mock,
            SessionConfig {
                checksum_rule: ChecksumRule::Sff,
                read_diagnostics: false,
                ..config()
            },
        );

        let report = s.read_module_as(ModuleType::Sfp).unwrap();
        assert!(report.checksums_ok());
        assert_eq!(report.a0.checksums[1].start, 64);

        let (_, checksums) = s.decode_buffer(&CAPTURED_SFP_A0);
        assert!(!any_checksum_failed(&checksums));
        let (_, checksums) =
            decode_buffer(ModuleType::Sfp, &CAPTURED_SFP_A0, ChecksumRule::ZeroSum);
        assert!(any_checksum_failed(&checksums));
    }

    #[test]
    fn test_read_skips_diagnostics_when_disabled() {
        let mock = MockTransport::new();
        mock.queue_byte(0x03);
        mock.queue_response(&captured_sfp_page());
        let mut s = session(
            &mock,
            SessionConfig {
                read_diagnostics: false,
                ..config()
            },
        );

        let report = s.read_module().unwrap();
        assert!(report.a2.is_none());
        assert!(report.diagnostics.is_none());
        assert_eq!(mock.get_sends().len(), 2);
    }

    #[test]
    fn test_read_module_as_skips_detection() {
        let mock = MockTransport::new();
        mock.queue_response(&[0u8; 256]);
        let mut s = session(&mock, config());

        let report = s.read_module_as(ModuleType::Qsfp).unwrap();
        assert_eq!(report.module, ModuleType::Qsfp);
        assert_eq!(s.selected_module(), ModuleType::Qsfp);
        assert_eq!(mock.get_sends().len(), 1);
        assert!(s.event_log().contains("(selected)"));
    }

    #[test]
    fn test_write_mismatch_logs_both_values() {
        let mock = MockTransport::new();
        mock.queue_byte(0x03);
        mock.queue_byte(0x20);
        let mut s = session(&mock, config());

        let result = s.write_byte(0xA0, 0x14, 0x4F);
        assert!(matches!(
            result,
            WriteResult::VerificationFailed {
                expected: 0x4F,
                observed: Some(0x20),
                ..
            }
        ));
        let log = s.event_log();
        assert!(log.contains("intended 0x4F"));
        assert!(log.contains("observed 0x20"));
        assert!(log.contains("Start Reboot Module."));
        // Detection, write, reboot, read-back.
        assert_eq!(mock.get_sends().len(), 4);
    }

    #[test]
    fn test_write_verified_after_detection() {
        let mock = MockTransport::new();
        mock.queue_byte(0x04);
        mock.queue_byte(0x4F);
        let mut s = session(&mock, config());

        let result = s.write_byte(0xA0, 0x14, 0x4F);
        assert!(result.is_verified());
        assert_eq!(s.selected_module(), ModuleType::SfpPlus);
        assert!(s.event_log().contains("Verify Code Successfully"));
    }

    #[test]
    fn test_write_error_names_step() {
        let mock = MockTransport::new();
        let mut s = session(&mock, SessionConfig::default());

        let result = s.write_byte_as(ModuleType::Sfp, 0xA0, 0x14, 0x4F);
        assert!(matches!(
            result,
            WriteResult::WriteError {
                step: memory::WriteStep::Write,
                ..
            }
        ));
        assert!(s.event_log().contains("write step failed"));
        assert_eq!(s.state().phase(), SessionPhase::Error);
    }

    #[test]
    fn test_decode_buffer_uses_selection() {
        let mock = MockTransport::new();
        let s = session(&mock, config());
        let (info, checksums) = s.decode_buffer(&zero_sum_sfp_page()[..96]);
        assert_eq!(info.module, ModuleType::Sfp);
        assert_eq!(info.serial_number, "L268A2305180095");
        assert_eq!(checksums.len(), 2);
        assert!(!any_checksum_failed(&checksums));
        assert!(mock.get_sends().is_empty());
    }

    #[test]
    fn test_log_is_ordered_and_timestamped() {
        let mock = MockTransport::new();
        mock.queue_byte(0x03);
        let mut s = session(&mock, config());
        s.detect_and_select();

        let lines = s.event_log().lines();
        assert!(lines[0].contains("Coding box connected (0483:5750)"));
        let tx = lines.iter().position(|l| l.contains("TX identify")).unwrap();
        let rx = lines.iter().position(|l| l.contains("RX identify")).unwrap();
        assert!(tx < rx);
    }

    #[test]
    fn test_config_toml() {
        let parsed: SessionConfig = toml::from_str(
            r#"
            default_module = "qsfp-dd"
            settle_ms = 1500
            checksum_rule = "sff"

            [commands.generic]
            write = "23 00 02 %a %o %v"

            [commands.modules.qsfp]
            reboot = "23 00 06"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.default_module, ModuleType::QsfpDd);
        assert_eq!(parsed.settle_ms, 1500);
        assert_eq!(parsed.response_timeout_ms, DEFAULT_RESPONSE_TIMEOUT_MS);
        assert!(parsed.auto_adopt);
        assert_eq!(parsed.checksum_rule, ChecksumRule::Sff);
        assert_eq!(config().checksum_rule, ChecksumRule::ZeroSum);
        assert_eq!(parsed.commands.generic.write.as_deref(), Some("23 00 02 %a %o %v"));
        assert!(parsed.commands.modules.contains_key(&ModuleType::Qsfp));

        let text = toml::to_string_pretty(&config()).unwrap();
        let back: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config());
    }

    #[test]
    fn test_config_file_rejects_bad_template() {
        let path = std::env::temp_dir().join(format!("xcvr-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[commands.generic]\nreboot = \"23 zz\"\n").unwrap();
        assert!(SessionConfig::load_from_file(&path).is_err());

        config().save_to_file(&path).unwrap();
        assert_eq!(SessionConfig::load_from_file(&path).unwrap(), config());
        let _ = std::fs::remove_file(&path);
    }
}
