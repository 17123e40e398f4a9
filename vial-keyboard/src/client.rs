//! Vial protocol client
//!
//! [`VialKeyboard`] composes the command channel, paged transfers and codecs
//! into named keyboard operations. Decoded device state (macro slots,
//! dynamic entries, the definition) is cached per connection and dropped
//! wholesale when the connection closes or fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vial_transport::protocol::{self, keyboard_value, page, via, vial};
use vial_transport::{ChannelConfig, CommandChannel, Transport, TransportError};

use crate::definition::{KeyboardDefinition, Matrix};
use crate::dynamic::{Combo, DynamicEntry, DynamicEntryCounts, KeyOverride, TapDance};
use crate::error::KeyboardError;
use crate::keycode::KeycodeConverter;
use crate::macros::{self, MacroAction, MacroCache};
use crate::paged::{read_paged, write_paged, BufferPages, DefinitionPages};
use crate::quantum;
use crate::settings::{
    EncoderAssignment, EncoderDirection, UnlockPoll, UnlockStatus, VialKeyboardId,
};
use crate::snapshot::{
    ComboConfig, KeyboardSnapshot, OverrideConfig, TapDanceConfig, SNAPSHOT_VERSION,
};

/// Bytes fetched per macro buffer read (four pages)
pub const MACRO_READ_WINDOW: usize = 4 * page::BUFFER;

/// Per-connection decoded state
#[derive(Default)]
struct ClientCache {
    macros: MacroCache,
    /// Slot count and buffer size
    macro_layout: Option<(usize, usize)>,
    entry_counts: Option<DynamicEntryCounts>,
    tap_dance: BTreeMap<u8, TapDance>,
    combo: BTreeMap<u8, Combo>,
    key_override: BTreeMap<u8, KeyOverride>,
    definition: Option<Arc<KeyboardDefinition>>,
    converter: Option<Arc<KeycodeConverter>>,
}

impl ClientCache {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Dynamic entry kinds with a cache table
trait CachedEntry: DynamicEntry {
    fn table(cache: &mut ClientCache) -> &mut BTreeMap<u8, Self>;
    fn capacity(counts: &DynamicEntryCounts) -> u8;
}

impl CachedEntry for TapDance {
    fn table(cache: &mut ClientCache) -> &mut BTreeMap<u8, Self> {
        &mut cache.tap_dance
    }

    fn capacity(counts: &DynamicEntryCounts) -> u8 {
        counts.tap_dance
    }
}

impl CachedEntry for Combo {
    fn table(cache: &mut ClientCache) -> &mut BTreeMap<u8, Self> {
        &mut cache.combo
    }

    fn capacity(counts: &DynamicEntryCounts) -> u8 {
        counts.combo
    }
}

impl CachedEntry for KeyOverride {
    fn table(cache: &mut ClientCache) -> &mut BTreeMap<u8, Self> {
        &mut cache.key_override
    }

    fn capacity(counts: &DynamicEntryCounts) -> u8 {
        counts.key_override
    }
}

/// Copy `N` response bytes starting at `at`
fn field<const N: usize>(resp: &[u8], at: usize, what: &str) -> Result<[u8; N], KeyboardError> {
    resp.get(at..at + N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            KeyboardError::UnexpectedResponse(format!(
                "{what}: response too short ({} bytes)",
                resp.len()
            ))
        })
}

/// High-level Vial keyboard interface
pub struct VialKeyboard {
    channel: Arc<CommandChannel>,
    cache: Arc<Mutex<ClientCache>>,
}

impl VialKeyboard {
    /// Create a client with default channel timing
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    /// Create a client with custom channel timing
    ///
    /// Takes over the transport's receive and close callbacks.
    pub fn with_config(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        let cache = Arc::new(Mutex::new(ClientCache::default()));
        let on_close = Arc::clone(&cache);
        transport.set_close_callback(Some(Arc::new(move || {
            info!("Connection closed, dropping cached keyboard state");
            on_close.lock().clear();
        })));
        Self {
            channel: Arc::new(CommandChannel::with_config(transport, config)),
            cache,
        }
    }

    /// Get the command channel
    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    /// Check if the device is still connected
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Close the connection
    pub async fn close(&self) -> Result<(), KeyboardError> {
        let result = self.channel.close().await;
        self.cache.lock().clear();
        Ok(result?)
    }

    /// Forget all cached device state
    pub fn invalidate_cache(&self) {
        self.cache.lock().clear();
    }

    /// Drop cached state when `result` reports a lost connection
    fn track<T>(&self, result: Result<T, KeyboardError>) -> Result<T, KeyboardError> {
        if let Err(e) = &result {
            if e.is_connection_lost() {
                debug!("Connection lost ({}), invalidating cache", e);
                self.cache.lock().clear();
            }
        }
        result
    }

    async fn command(&self, report: &[u8]) -> Result<Vec<u8>, KeyboardError> {
        self.track(self.channel.send(report).await.map_err(KeyboardError::from))
    }

    async fn batch(&self, reports: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, KeyboardError> {
        self.track(self.channel.send_batch(reports).await.map_err(KeyboardError::from))
    }

    // === Device Info ===

    /// Get the VIA protocol version
    pub async fn get_protocol_version(&self) -> Result<u16, KeyboardError> {
        let resp = self.command(&[via::GET_PROTOCOL_VERSION]).await?;
        Ok(u16::from_be_bytes(field(&resp, 1, "protocol version")?))
    }

    /// Get the Vial protocol revision and keyboard UID
    pub async fn get_keyboard_id(&self) -> Result<VialKeyboardId, KeyboardError> {
        let resp = self
            .command(&protocol::vial_report(vial::GET_KEYBOARD_ID, &[]))
            .await?;
        VialKeyboardId::from_bytes(&resp)
            .ok_or_else(|| KeyboardError::UnexpectedResponse("Invalid keyboard id response".into()))
    }

    async fn get_keyboard_value(&self, id: u8) -> Result<u32, KeyboardError> {
        let resp = self.command(&[via::GET_KEYBOARD_VALUE, id]).await?;
        Ok(u32::from_be_bytes(field(&resp, 2, "keyboard value")?))
    }

    /// Get firmware uptime in milliseconds
    pub async fn get_uptime(&self) -> Result<u32, KeyboardError> {
        self.get_keyboard_value(keyboard_value::UPTIME).await
    }

    /// Get the layout options word
    pub async fn get_layout_options(&self) -> Result<u32, KeyboardError> {
        self.get_keyboard_value(keyboard_value::LAYOUT_OPTIONS).await
    }

    /// Set the layout options word
    pub async fn set_layout_options(&self, options: u32) -> Result<(), KeyboardError> {
        let mut report = vec![via::SET_KEYBOARD_VALUE, keyboard_value::LAYOUT_OPTIONS];
        report.extend(options.to_be_bytes());
        self.command(&report).await?;
        Ok(())
    }

    /// Get the number of keymap layers
    pub async fn get_layer_count(&self) -> Result<u8, KeyboardError> {
        let resp = self.command(&[via::GET_LAYER_COUNT]).await?;
        let [count] = field(&resp, 1, "layer count")?;
        Ok(count)
    }

    // === Definition ===

    /// Fetch and decode the keyboard definition
    ///
    /// The result is cached until the connection closes.
    pub async fn get_definition(&self) -> Result<Arc<KeyboardDefinition>, KeyboardError> {
        let cached = self.cache.lock().definition.clone();
        if let Some(definition) = cached {
            return Ok(definition);
        }

        let resp = self
            .command(&protocol::vial_report(vial::GET_SIZE, &[]))
            .await?;
        let size = u32::from_le_bytes(field(&resp, 0, "definition size")?) as usize;
        if size == 0 {
            return Err(KeyboardError::Definition(
                "device reports an empty definition".into(),
            ));
        }

        let blob = self.track(read_paged(&self.channel, &DefinitionPages, 0, size).await)?;
        let definition = Arc::new(KeyboardDefinition::from_compressed(&blob)?);
        info!(
            "Definition loaded: {}x{} matrix, {} custom keycodes",
            definition.matrix.rows,
            definition.matrix.cols,
            definition.custom_keycodes.len()
        );

        let converter = Arc::new(KeycodeConverter::new(definition.custom_keycodes.clone()));
        let mut cache = self.cache.lock();
        cache.definition = Some(Arc::clone(&definition));
        cache.converter = Some(converter);
        Ok(definition)
    }

    /// Keycode converter for this keyboard
    ///
    /// Knows the custom keycodes once the definition has been fetched.
    pub fn keycode_converter(&self) -> Arc<KeycodeConverter> {
        let mut cache = self.cache.lock();
        Arc::clone(
            cache
                .converter
                .get_or_insert_with(|| Arc::new(KeycodeConverter::default())),
        )
    }

    // === Keymap ===

    /// Get the keycode at one matrix position
    pub async fn get_keycode(&self, layer: u8, row: u8, col: u8) -> Result<u16, KeyboardError> {
        let resp = self
            .command(&[via::DYNAMIC_KEYMAP_GET_KEYCODE, layer, row, col])
            .await?;
        Ok(u16::from_be_bytes(field(&resp, 4, "keycode")?))
    }

    /// Set the keycode at one matrix position
    pub async fn set_keycode(
        &self,
        layer: u8,
        row: u8,
        col: u8,
        keycode: u16,
    ) -> Result<(), KeyboardError> {
        let [hi, lo] = keycode.to_be_bytes();
        self.command(&[via::DYNAMIC_KEYMAP_SET_KEYCODE, layer, row, col, hi, lo])
            .await?;
        Ok(())
    }

    /// Byte offset and length of one layer in the keymap buffer
    fn layer_span(layer: u8, matrix: Matrix) -> (usize, usize) {
        let len = matrix.key_count() * 2;
        (usize::from(layer) * len, len)
    }

    /// Read one layer, row-major
    pub async fn get_layer(&self, layer: u8, matrix: Matrix) -> Result<Vec<u16>, KeyboardError> {
        let (offset, len) = Self::layer_span(layer, matrix);
        let bytes = self.track(read_paged(&self.channel, &BufferPages::KEYMAP, offset, len).await)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect())
    }

    /// Write one layer, row-major
    pub async fn set_layer(
        &self,
        layer: u8,
        matrix: Matrix,
        keycodes: &[u16],
    ) -> Result<(), KeyboardError> {
        if keycodes.len() != matrix.key_count() {
            return Err(KeyboardError::InvalidParameter(format!(
                "layer needs {} keycodes, got {}",
                matrix.key_count(),
                keycodes.len()
            )));
        }
        let (offset, _) = Self::layer_span(layer, matrix);
        let data: Vec<u8> = keycodes.iter().flat_map(|kc| kc.to_be_bytes()).collect();
        self.track(write_paged(&self.channel, &BufferPages::KEYMAP, offset, &data).await)
    }

    /// Restore the firmware default keymap
    pub async fn reset_keymap(&self) -> Result<(), KeyboardError> {
        self.command(&[via::DYNAMIC_KEYMAP_RESET]).await?;
        Ok(())
    }

    // === Encoders ===

    /// Read `[counter-clockwise, clockwise]` keycodes of every encoder on a layer
    pub async fn get_encoders(&self, layer: u8, count: u8) -> Result<Vec<[u16; 2]>, KeyboardError> {
        let requests: Vec<Vec<u8>> = (0..count)
            .map(|index| protocol::vial_report(vial::GET_ENCODER, &[layer, index]))
            .collect();
        let responses = self.batch(&requests).await?;
        responses
            .iter()
            .map(|resp| -> Result<[u16; 2], KeyboardError> {
                Ok([
                    u16::from_be_bytes(field(resp, 0, "encoder")?),
                    u16::from_be_bytes(field(resp, 2, "encoder")?),
                ])
            })
            .collect()
    }

    /// Write encoder keycodes
    pub async fn set_encoders(&self, assignments: &[EncoderAssignment]) -> Result<(), KeyboardError> {
        let requests: Vec<Vec<u8>> = assignments
            .iter()
            .map(|a| {
                let [hi, lo] = a.keycode.to_be_bytes();
                protocol::vial_report(
                    vial::SET_ENCODER,
                    &[a.layer, a.index, a.direction as u8, hi, lo],
                )
            })
            .collect();
        self.batch(&requests).await?;
        Ok(())
    }

    // === Macros ===

    /// Get the number of macro slots
    pub async fn get_macro_count(&self) -> Result<u8, KeyboardError> {
        let resp = self.command(&[via::MACRO_GET_COUNT]).await?;
        let [count] = field(&resp, 1, "macro count")?;
        Ok(count)
    }

    /// Get the macro buffer size in bytes
    pub async fn get_macro_buffer_size(&self) -> Result<u16, KeyboardError> {
        let resp = self.command(&[via::MACRO_GET_BUFFER_SIZE]).await?;
        Ok(u16::from_be_bytes(field(&resp, 1, "macro buffer size")?))
    }

    async fn macro_layout(&self) -> Result<(usize, usize), KeyboardError> {
        let cached = self.cache.lock().macro_layout;
        if let Some(layout) = cached {
            return Ok(layout);
        }
        let layout = (
            usize::from(self.get_macro_count().await?),
            usize::from(self.get_macro_buffer_size().await?),
        );
        self.cache.lock().macro_layout = Some(layout);
        Ok(layout)
    }

    /// Fetch slots beyond the cached prefix until `index` is cached
    async fn materialize_macros(
        &self,
        index: usize,
        count: usize,
        size: usize,
    ) -> Result<(), KeyboardError> {
        let mut cursor = self.cache.lock().macros.cursor();
        // Bytes of a slot not yet terminated within the windows read so far
        let mut pending = Vec::new();

        while cursor.next_slot <= index {
            let read_at = cursor.offset + pending.len();
            if read_at >= size {
                return Err(KeyboardError::UnexpectedResponse(format!(
                    "macro buffer ends before slot {index}"
                )));
            }
            let len = MACRO_READ_WINDOW.min(size - read_at);
            let window = self.track(read_paged(&self.channel, &BufferPages::MACRO, read_at, len).await)?;
            pending.extend_from_slice(&window);

            let Some(last) = pending.iter().rposition(|&b| b == macros::TERMINATOR) else {
                continue;
            };
            let complete: Vec<u8> = pending.drain(..=last).collect();
            let slots = macros::split_slots(&complete);
            let read = slots.len();
            debug!(
                "Macro slots {}..{} read at offset {}",
                cursor.next_slot,
                cursor.next_slot + read,
                cursor.offset
            );
            self.cache.lock().macros.absorb(cursor.next_slot, slots, count);
            cursor.next_slot += read;
            cursor.offset += complete.len();
        }
        Ok(())
    }

    /// Read one macro
    ///
    /// Only slots past the cached prefix are fetched.
    pub async fn get_macro(&self, index: u8) -> Result<Vec<MacroAction>, KeyboardError> {
        let (count, size) = self.macro_layout().await?;
        let index = usize::from(index);
        if index >= count {
            return Err(KeyboardError::InvalidParameter(format!(
                "macro {index} out of range (device has {count})"
            )));
        }
        let cached = self.cache.lock().macros.contains(index);
        if !cached {
            self.materialize_macros(index, count, size).await?;
        }
        let cache = self.cache.lock();
        cache
            .macros
            .get(index)
            .map(macros::parse_actions)
            .ok_or_else(|| KeyboardError::UnexpectedResponse(format!("macro {index} not cached")))
    }

    /// Rewrite one macro
    ///
    /// Bytes before the edited slot stay untouched on the device; the slot
    /// and everything after it is rewritten.
    pub async fn set_macro(&self, index: u8, actions: &[MacroAction]) -> Result<(), KeyboardError> {
        let bytes = macros::serialize_actions(actions)?;
        let (count, size) = self.macro_layout().await?;
        let index = usize::from(index);
        if index >= count {
            return Err(KeyboardError::InvalidParameter(format!(
                "macro {index} out of range (device has {count})"
            )));
        }
        self.materialize_macros(count - 1, count, size).await?;

        let plan = self
            .cache
            .lock()
            .macros
            .plan_write(index, &bytes)
            .ok_or_else(|| {
                KeyboardError::UnexpectedResponse(format!("slots below macro {index} not cached"))
            })?;
        let end = plan.offset + plan.data.len();
        if end > size {
            return Err(KeyboardError::InvalidParameter(format!(
                "macros need {end} bytes, buffer holds {size}"
            )));
        }

        self.track(write_paged(&self.channel, &BufferPages::MACRO, plan.offset, &plan.data).await)?;
        self.cache.lock().macros.store(index, bytes);
        Ok(())
    }

    /// Clear every macro
    pub async fn reset_macros(&self) -> Result<(), KeyboardError> {
        self.command(&[via::MACRO_RESET]).await?;
        self.cache.lock().macros.clear();
        Ok(())
    }

    // === Dynamic Entries ===

    /// Get tap-dance, combo and key-override table sizes
    pub async fn get_dynamic_entry_counts(&self) -> Result<DynamicEntryCounts, KeyboardError> {
        let cached = self.cache.lock().entry_counts;
        if let Some(counts) = cached {
            return Ok(counts);
        }
        let resp = self.command(&DynamicEntryCounts::request()).await?;
        let counts = DynamicEntryCounts::from_response(&resp);
        self.cache.lock().entry_counts = Some(counts);
        Ok(counts)
    }

    async fn check_entry_indices<T: CachedEntry>(
        &self,
        mut indices: impl Iterator<Item = u8>,
    ) -> Result<(), KeyboardError> {
        let capacity = T::capacity(&self.get_dynamic_entry_counts().await?);
        match indices.find(|&i| i >= capacity) {
            Some(bad) => Err(KeyboardError::InvalidParameter(format!(
                "{} {bad} out of range (device has {capacity})",
                T::NAME
            ))),
            None => Ok(()),
        }
    }

    async fn get_entries<T: CachedEntry>(&self, indices: &[u8]) -> Result<Vec<T>, KeyboardError> {
        self.check_entry_indices::<T>(indices.iter().copied()).await?;

        let mut missing: Vec<u8> = {
            let mut cache = self.cache.lock();
            let table = T::table(&mut cache);
            indices
                .iter()
                .copied()
                .filter(|i| !table.contains_key(i))
                .collect()
        };
        missing.sort_unstable();
        missing.dedup();

        let mut fetched = Vec::with_capacity(missing.len());
        if !missing.is_empty() {
            let requests: Vec<Vec<u8>> = missing.iter().map(|&i| T::get_request(i)).collect();
            let responses = self.batch(&requests).await?;
            for (&index, resp) in missing.iter().zip(&responses) {
                if resp.first() != Some(&0) {
                    debug!("{} {} absent, status {:?}", T::NAME, index, resp.first());
                }
                fetched.push((index, T::from_response(resp)));
            }
        }

        let mut cache = self.cache.lock();
        let table = T::table(&mut cache);
        table.extend(fetched);
        Ok(indices
            .iter()
            .map(|i| table.get(i).cloned().unwrap_or_default())
            .collect())
    }

    async fn set_entries<T: CachedEntry>(&self, entries: &[(u8, T)]) -> Result<(), KeyboardError> {
        self.check_entry_indices::<T>(entries.iter().map(|(i, _)| *i))
            .await?;
        let requests: Vec<Vec<u8>> = entries.iter().map(|(i, e)| e.set_request(*i)).collect();
        let responses = self.batch(&requests).await?;

        let mut cache = self.cache.lock();
        let table = T::table(&mut cache);
        for ((index, entry), resp) in entries.iter().zip(&responses) {
            match resp.first() {
                Some(0) => {
                    table.insert(*index, entry.clone());
                }
                status => {
                    warn!("Device rejected {} {}: status {:?}", T::NAME, index, status);
                    table.remove(index);
                }
            }
        }
        Ok(())
    }

    /// Read tap-dance entries
    pub async fn get_tap_dances(&self, indices: &[u8]) -> Result<Vec<TapDance>, KeyboardError> {
        self.get_entries(indices).await
    }

    /// Write tap-dance entries
    pub async fn set_tap_dances(&self, entries: &[(u8, TapDance)]) -> Result<(), KeyboardError> {
        self.set_entries(entries).await
    }

    /// Read combo entries
    pub async fn get_combos(&self, indices: &[u8]) -> Result<Vec<Combo>, KeyboardError> {
        self.get_entries(indices).await
    }

    /// Write combo entries
    pub async fn set_combos(&self, entries: &[(u8, Combo)]) -> Result<(), KeyboardError> {
        self.set_entries(entries).await
    }

    /// Read key-override entries
    pub async fn get_key_overrides(&self, indices: &[u8]) -> Result<Vec<KeyOverride>, KeyboardError> {
        self.get_entries(indices).await
    }

    /// Write key-override entries
    pub async fn set_key_overrides(
        &self,
        entries: &[(u8, KeyOverride)],
    ) -> Result<(), KeyboardError> {
        self.set_entries(entries).await
    }

    // === Quantum Settings ===

    /// Enumerate the setting ids the firmware supports
    pub async fn query_quantum_settings(&self) -> Result<Vec<u16>, KeyboardError> {
        let mut supported = Vec::new();
        let mut after = 0u16;
        loop {
            let resp = self.command(&quantum::query_request(after)).await?;
            let (ids, done) = quantum::parse_query_response(&resp);
            let highest = ids.iter().copied().max();
            supported.extend(ids);
            match highest {
                Some(highest) if !done && highest > after => after = highest,
                _ => break,
            }
        }
        supported.sort_unstable();
        supported.dedup();
        debug!("Firmware supports {} QMK settings", supported.len());
        Ok(supported)
    }

    /// Read one setting, masked to its width
    pub async fn get_quantum_setting(&self, id: u16) -> Result<u32, KeyboardError> {
        let width = quantum::find_setting(id).map_or(4, |s| s.width);
        let resp = self.command(&quantum::get_request(id)).await?;
        quantum::parse_get_response(&resp)
            .map(|raw| quantum::mask_to_width(raw, width))
            .ok_or_else(|| KeyboardError::NotSupported(format!("QMK setting {id}")))
    }

    /// Read every catalog setting the firmware answers for
    pub async fn read_all_quantum_settings(&self) -> Result<BTreeMap<u16, u32>, KeyboardError> {
        let settings: Vec<&quantum::QuantumSetting> = quantum::all_settings().collect();
        let requests: Vec<Vec<u8>> = settings.iter().map(|s| quantum::get_request(s.id)).collect();
        let responses = self.batch(&requests).await?;
        let mut values = BTreeMap::new();
        for (setting, resp) in settings.iter().zip(&responses) {
            match quantum::parse_get_response(resp) {
                Some(raw) => {
                    values.insert(setting.id, setting.mask(raw));
                }
                None => debug!("QMK setting {} ({}) unsupported", setting.id, setting.label),
            }
        }
        Ok(values)
    }

    /// Write one setting
    pub async fn set_quantum_setting(&self, id: u16, value: u32) -> Result<(), KeyboardError> {
        let width = match quantum::find_setting(id) {
            Some(setting) if !setting.accepts(value) => {
                return Err(KeyboardError::InvalidParameter(format!(
                    "{value} is not valid for {}",
                    setting.label
                )));
            }
            Some(setting) => setting.width,
            None => 4,
        };
        self.command(&quantum::set_request(id, value, width)).await?;
        Ok(())
    }

    /// Restore firmware defaults for every setting
    pub async fn reset_quantum_settings(&self) -> Result<(), KeyboardError> {
        self.command(&protocol::vial_report(vial::QMK_SETTINGS_RESET, &[]))
            .await?;
        Ok(())
    }

    // === Security Lock ===

    pub async fn get_unlock_status(&self) -> Result<UnlockStatus, KeyboardError> {
        let resp = self
            .command(&protocol::vial_report(vial::GET_UNLOCK_STATUS, &[]))
            .await?;
        Ok(UnlockStatus::from_bytes(&resp))
    }

    /// Begin unlocking; the user must then hold the unlock keys
    pub async fn unlock_start(&self) -> Result<(), KeyboardError> {
        self.command(&protocol::vial_report(vial::UNLOCK_START, &[]))
            .await?;
        Ok(())
    }

    pub async fn unlock_poll(&self) -> Result<UnlockPoll, KeyboardError> {
        let resp = self
            .command(&protocol::vial_report(vial::UNLOCK_POLL, &[]))
            .await?;
        Ok(UnlockPoll::from_bytes(&resp))
    }

    pub async fn lock(&self) -> Result<(), KeyboardError> {
        self.command(&protocol::vial_report(vial::LOCK, &[])).await?;
        Ok(())
    }

    // === Custom Values ===

    /// Get a keyboard-specific value
    ///
    /// # Arguments
    /// * `id` - Channel and value id bytes, echoed back by the device
    pub async fn get_custom_value(&self, id: &[u8]) -> Result<u32, KeyboardError> {
        let mut report = vec![via::CUSTOM_PREFIX, via::CUSTOM_GET_VALUE];
        report.extend_from_slice(id);
        let resp = self.command(&report).await?;
        Ok(u32::from_le_bytes(field(&resp, 2 + id.len(), "custom value")?))
    }

    /// Set a keyboard-specific value
    pub async fn set_custom_value(&self, id: &[u8], value: u32) -> Result<(), KeyboardError> {
        let mut report = vec![via::CUSTOM_PREFIX, via::CUSTOM_SET_VALUE];
        report.extend_from_slice(id);
        report.extend(value.to_le_bytes());
        self.command(&report).await?;
        Ok(())
    }

    /// Persist a keyboard-specific value
    pub async fn save_custom_value(&self, id: &[u8]) -> Result<(), KeyboardError> {
        let mut report = vec![via::CUSTOM_PREFIX, via::CUSTOM_SAVE];
        report.extend_from_slice(id);
        self.command(&report).await?;
        Ok(())
    }

    /// Wipe the keyboard's EEPROM
    pub async fn reset_eeprom(&self) -> Result<(), KeyboardError> {
        self.command(&[via::CUSTOM_PREFIX, via::EEPROM_RESET]).await?;
        self.invalidate_cache();
        Ok(())
    }

    /// Reboot into the bootloader
    ///
    /// The device usually drops off the bus without answering.
    pub async fn jump_to_bootloader(&self) -> Result<(), KeyboardError> {
        match self.channel.send(&[via::BOOTLOADER_JUMP]).await {
            Ok(_) | Err(TransportError::Timeout) => {
                self.invalidate_cache();
                Ok(())
            }
            Err(e) => self.track(Err(e.into())),
        }
    }

    // === Snapshot ===

    /// Read the full decoded configuration
    pub async fn export_snapshot(&self) -> Result<KeyboardSnapshot, KeyboardError> {
        let definition = self.get_definition().await?;
        let converter = self.keycode_converter();
        let via_protocol = self.get_protocol_version().await?;
        let id = self.get_keyboard_id().await?;
        let layout_options = self.get_layout_options().await?;
        let layer_count = self.get_layer_count().await?;
        let encoder_count = u8::try_from(definition.encoder_count()).unwrap_or(u8::MAX);

        let mut layers = Vec::with_capacity(usize::from(layer_count));
        let mut encoders = Vec::new();
        for layer in 0..layer_count {
            let keycodes = self.get_layer(layer, definition.matrix).await?;
            layers.push(keycodes.iter().map(|&kc| converter.name(kc)).collect());
            if encoder_count > 0 {
                let pairs = self.get_encoders(layer, encoder_count).await?;
                encoders.push(
                    pairs
                        .iter()
                        .map(|&[ccw, cw]| [converter.name(ccw), converter.name(cw)])
                        .collect(),
                );
            }
        }

        let counts = self.get_dynamic_entry_counts().await?;
        let tap_dance = self
            .get_tap_dances(&(0..counts.tap_dance).collect::<Vec<_>>())
            .await?
            .iter()
            .map(|td| TapDanceConfig::from_entry(td, &converter))
            .collect();
        let combo = self
            .get_combos(&(0..counts.combo).collect::<Vec<_>>())
            .await?
            .iter()
            .map(|c| ComboConfig::from_entry(c, &converter))
            .collect();
        let key_override = self
            .get_key_overrides(&(0..counts.key_override).collect::<Vec<_>>())
            .await?
            .iter()
            .map(|ko| OverrideConfig::from_entry(ko, &converter))
            .collect();
        let quantum_settings = self.read_all_quantum_settings().await?;

        info!(
            "Exported {} layers, {} tap dances, {} combos, {} overrides",
            layer_count, counts.tap_dance, counts.combo, counts.key_override
        );
        Ok(KeyboardSnapshot {
            version: SNAPSHOT_VERSION,
            uid: id.uid_hex(),
            via_protocol,
            vial_protocol: id.protocol,
            layout_options,
            layers,
            encoders,
            tap_dance,
            combo,
            key_override,
            quantum_settings,
        })
    }

    /// Write a decoded configuration back to the device
    ///
    /// Entries beyond the device's capacity are skipped.
    pub async fn import_snapshot(&self, snapshot: &KeyboardSnapshot) -> Result<(), KeyboardError> {
        let definition = self.get_definition().await?;
        let converter = self.keycode_converter();
        let id = self.get_keyboard_id().await?;
        if id.uid_hex() != snapshot.uid {
            warn!(
                "Snapshot was taken from keyboard {}, restoring onto {}",
                snapshot.uid,
                id.uid_hex()
            );
        }

        let layer_count = self.get_layer_count().await?;
        if snapshot.layers.len() > usize::from(layer_count) {
            warn!(
                "Snapshot has {} layers, device has {}",
                snapshot.layers.len(),
                layer_count
            );
        }
        for (layer, keycodes) in (0..layer_count).zip(snapshot.layer_values(&converter)) {
            self.set_layer(layer, definition.matrix, &keycodes).await?;
        }

        let assignments: Vec<EncoderAssignment> = (0..layer_count)
            .zip(snapshot.encoder_values(&converter))
            .flat_map(|(layer, encoders)| {
                (0..=u8::MAX).zip(encoders).flat_map(move |(index, [ccw, cw])| {
                    [
                        (EncoderDirection::CounterClockwise, ccw),
                        (EncoderDirection::Clockwise, cw),
                    ]
                    .map(|(direction, keycode)| EncoderAssignment {
                        layer,
                        index,
                        direction,
                        keycode,
                    })
                })
            })
            .collect();
        self.set_encoders(&assignments).await?;

        let counts = self.get_dynamic_entry_counts().await?;
        let tap_dances: Vec<(u8, TapDance)> = (0..counts.tap_dance)
            .zip(&snapshot.tap_dance)
            .map(|(i, td)| (i, td.to_entry(&converter)))
            .collect();
        self.set_tap_dances(&tap_dances).await?;
        let combos: Vec<(u8, Combo)> = (0..counts.combo)
            .zip(&snapshot.combo)
            .map(|(i, c)| (i, c.to_entry(&converter)))
            .collect();
        self.set_combos(&combos).await?;
        let overrides: Vec<(u8, KeyOverride)> = (0..counts.key_override)
            .zip(&snapshot.key_override)
            .map(|(i, ko)| (i, ko.to_entry(&converter)))
            .collect();
        self.set_key_overrides(&overrides).await?;

        for (&id, &value) in &snapshot.quantum_settings {
            self.set_quantum_setting(id, value).await?;
        }
        self.set_layout_options(snapshot.layout_options).await?;
        info!("Snapshot restored");
        Ok(())
    }
}

impl Drop for VialKeyboard {
    fn drop(&mut self) {
        self.channel.transport().set_close_callback(None);
    }
}
