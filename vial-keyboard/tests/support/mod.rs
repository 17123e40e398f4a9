//! Simulated Vial keyboard answering over a `MockTransport`

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use vial_keyboard::{ChannelConfig, VialKeyboard};
use vial_transport::MockTransport;

pub const DEFINITION_JSON: &str = r#"{
    "name": "Sim 8x12",
    "matrix": {"rows": 8, "cols": 12},
    "customKeycodes": [
        {"name": "CK_RGB", "title": "Toggle RGB", "shortName": "RGB"}
    ],
    "layouts": {
        "keymap": [
            ["0,0", "0,1", "0,0\n\n\n\n\n\n\n\n\ne", "0,1\n\n\n\n\n\n\n\n\ne"],
            ["1,0", "1,0\n\n\n\n\n\n\n\n\ne", "1,1\n\n\n\n\n\n\n\n\ne"]
        ]
    }
}"#;

pub const ROWS: usize = 8;
pub const COLS: usize = 12;

/// Device-side state
pub struct SimState {
    pub layers: u8,
    /// Big-endian keycodes, layer-major then row-major
    pub keymap: Vec<u8>,
    pub macro_count: u8,
    pub macro_buffer: Vec<u8>,
    pub tap_dance_count: u8,
    pub combo_count: u8,
    pub override_count: u8,
    /// Stored records by (op kind, index); absent records answer status 1
    pub tap_dance: BTreeMap<u8, Vec<u8>>,
    pub combo: BTreeMap<u8, Vec<u8>>,
    pub key_override: BTreeMap<u8, Vec<u8>>,
    /// (layer, encoder) -> [ccw, cw]
    pub encoders: BTreeMap<(u8, u8), [u16; 2]>,
    pub qmk: BTreeMap<u16, u32>,
    pub layout_options: u32,
    pub uid: u64,
    pub definition: Vec<u8>,
    /// (channel, value id) -> value
    pub custom_values: BTreeMap<(u8, u8), u32>,
    /// Custom values persisted with a save command
    pub saved_custom_values: Vec<(u8, u8)>,
    pub unlocked: bool,
    pub eeprom_resets: usize,
}

impl SimState {
    pub fn new() -> Self {
        let mut definition = Vec::new();
        lzma_rs::xz_compress(&mut DEFINITION_JSON.as_bytes(), &mut definition).unwrap();
        Self {
            layers: 2,
            keymap: vec![0; 2 * ROWS * COLS * 2],
            macro_count: 4,
            macro_buffer: vec![0; 512],
            tap_dance_count: 4,
            combo_count: 4,
            override_count: 2,
            tap_dance: BTreeMap::new(),
            combo: BTreeMap::new(),
            key_override: BTreeMap::new(),
            encoders: BTreeMap::new(),
            qmk: BTreeMap::new(),
            layout_options: 0,
            uid: 0x0123_4567_89AB_CDEF,
            definition,
            custom_values: BTreeMap::new(),
            saved_custom_values: Vec::new(),
            unlocked: false,
            eeprom_resets: 0,
        }
    }

    pub fn keycode(&self, layer: usize, row: usize, col: usize) -> u16 {
        let at = ((layer * ROWS + row) * COLS + col) * 2;
        u16::from_be_bytes([self.keymap[at], self.keymap[at + 1]])
    }

    pub fn set_keycode(&mut self, layer: usize, row: usize, col: usize, keycode: u16) {
        let at = ((layer * ROWS + row) * COLS + col) * 2;
        self.keymap[at..at + 2].copy_from_slice(&keycode.to_be_bytes());
    }

    /// Lay out macro slots from the start of the buffer
    pub fn set_macros(&mut self, slots: &[&[u8]]) {
        self.macro_buffer.fill(0);
        let mut at = 0;
        for slot in slots {
            self.macro_buffer[at..at + slot.len()].copy_from_slice(slot);
            at += slot.len() + 1;
        }
    }
}

fn read_window(buffer: &[u8], offset: usize, size: usize) -> Vec<u8> {
    (offset..offset + size)
        .map(|i| buffer.get(i).copied().unwrap_or(0))
        .collect()
}

fn write_window(buffer: &mut [u8], offset: usize, data: &[u8]) {
    for (i, b) in data.iter().enumerate() {
        if let Some(slot) = buffer.get_mut(offset + i) {
            *slot = *b;
        }
    }
}

fn le_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .enumerate()
        .fold(0, |acc, (i, b)| acc | (u32::from(*b) << (8 * i)))
}

pub struct SimulatedVial {
    pub state: Mutex<SimState>,
}

impl SimulatedVial {
    pub fn new(state: SimState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn respond(&self, req: &[u8]) -> Option<Vec<u8>> {
        let mut s = self.state.lock();
        let mut resp = req.to_vec();
        match req[0] {
            0x01 => resp = vec![0x01, 0x00, 0x09],
            0x02 => {
                let value = if req[1] == 0x02 { s.layout_options } else { 1000 };
                resp.truncate(2);
                resp.extend(value.to_be_bytes());
            }
            0x03 => s.layout_options = u32::from_be_bytes([req[2], req[3], req[4], req[5]]),
            0x04 => {
                let kc = s.keycode(req[1].into(), req[2].into(), req[3].into());
                resp.extend(kc.to_be_bytes());
            }
            0x05 => {
                let kc = u16::from_be_bytes([req[4], req[5]]);
                s.set_keycode(req[1].into(), req[2].into(), req[3].into(), kc);
            }
            0x0C => resp = vec![0x0C, s.macro_count],
            0x0D => {
                let [hi, lo] = (s.macro_buffer.len() as u16).to_be_bytes();
                resp = vec![0x0D, hi, lo];
            }
            0x0E | 0x12 => {
                let offset = usize::from(u16::from_be_bytes([req[1], req[2]]));
                let size = usize::from(req[3]);
                let buffer = if req[0] == 0x0E { &s.macro_buffer } else { &s.keymap };
                resp.extend(read_window(buffer, offset, size));
            }
            0x0F | 0x13 => {
                let offset = usize::from(u16::from_be_bytes([req[1], req[2]]));
                let size = usize::from(req[3]);
                let data = &req[4..4 + size];
                let buffer = if req[0] == 0x0F {
                    &mut s.macro_buffer
                } else {
                    &mut s.keymap
                };
                write_window(buffer, offset, data);
            }
            0x06 => s.keymap.fill(0),
            0x10 => s.macro_buffer.fill(0),
            0x11 => resp = vec![0x11, s.layers],
            0xFE => resp = Self::vial(&mut s, req),
            0xFF => resp = Self::custom(&mut s, req),
            _ => resp = vec![0xFF],
        }
        Some(resp)
    }

    fn vial(s: &mut SimState, req: &[u8]) -> Vec<u8> {
        match req[1] {
            0x00 => {
                let mut resp = 6u32.to_le_bytes().to_vec();
                resp.extend(s.uid.to_le_bytes());
                resp
            }
            0x01 => (s.definition.len() as u32).to_le_bytes().to_vec(),
            0x02 => {
                let page = usize::from(u16::from_le_bytes([req[2], req[3]]));
                read_window(&s.definition, page * 32, 32)
            }
            0x03 => {
                let [ccw, cw] = s.encoders.get(&(req[2], req[3])).copied().unwrap_or([0, 0]);
                let mut resp = ccw.to_be_bytes().to_vec();
                resp.extend(cw.to_be_bytes());
                resp
            }
            0x04 => {
                let kc = u16::from_be_bytes([req[5], req[6]]);
                let entry = s.encoders.entry((req[2], req[3])).or_insert([0, 0]);
                entry[usize::from(req[4])] = kc;
                vec![0]
            }
            0x09 => {
                let after = u16::from_le_bytes([req[2], req[3]]);
                let ids: Vec<u16> = s.qmk.keys().copied().filter(|&id| id > after).collect();
                let mut resp: Vec<u8> = ids.iter().take(16).flat_map(|id| id.to_le_bytes()).collect();
                resp.resize(32, 0xFF);
                resp
            }
            0x0A => {
                let id = u16::from_le_bytes([req[2], req[3]]);
                match s.qmk.get(&id) {
                    Some(value) => {
                        let mut resp = vec![0];
                        resp.extend(value.to_le_bytes());
                        resp
                    }
                    None => vec![1],
                }
            }
            0x0B => {
                let id = u16::from_le_bytes([req[2], req[3]]);
                s.qmk.insert(id, le_value(&req[4..]));
                vec![0]
            }
            0x06 => {
                s.unlocked = true;
                vec![0]
            }
            0x08 => {
                s.unlocked = false;
                vec![0]
            }
            0x0C => {
                s.qmk.clear();
                vec![0]
            }
            0x0D => Self::dynamic_entry(s, req),
            _ => vec![0xFF],
        }
    }

    fn custom(s: &mut SimState, req: &[u8]) -> Vec<u8> {
        let mut resp = req.to_vec();
        match req[1] {
            0x07 => {
                s.custom_values.insert((req[2], req[3]), le_value(&req[4..]));
            }
            0x08 => {
                let value = s.custom_values.get(&(req[2], req[3])).copied().unwrap_or(0);
                resp.truncate(4);
                resp.extend(value.to_le_bytes());
            }
            0x09 => s.saved_custom_values.push((req[2], req[3])),
            0x0A => {
                s.keymap.fill(0);
                s.macro_buffer.fill(0);
                s.tap_dance.clear();
                s.combo.clear();
                s.key_override.clear();
                s.qmk.clear();
                s.eeprom_resets += 1;
            }
            _ => resp = vec![0xFF],
        }
        resp
    }

    fn dynamic_entry(s: &mut SimState, req: &[u8]) -> Vec<u8> {
        let op = req[2];
        if op == 0 {
            let mut resp = vec![s.tap_dance_count, s.combo_count, s.override_count];
            resp.resize(32, 0);
            resp[31] = 0x01;
            return resp;
        }
        let index = req[3];
        let table = match op {
            1 | 2 => &mut s.tap_dance,
            3 | 4 => &mut s.combo,
            _ => &mut s.key_override,
        };
        if op % 2 == 1 {
            match table.get(&index) {
                Some(record) => {
                    let mut resp = vec![0];
                    resp.extend(record);
                    resp
                }
                None => vec![1],
            }
        } else {
            table.insert(index, req[4..].to_vec());
            vec![0]
        }
    }
}

/// Wire a simulated device to a keyboard client
pub fn connect(state: SimState) -> (Arc<SimulatedVial>, Arc<MockTransport>, VialKeyboard) {
    let sim = SimulatedVial::new(state);
    let device = Arc::clone(&sim);
    let mock = Arc::new(MockTransport::new(move |req| device.respond(req)));
    let config = ChannelConfig::default()
        .with_command_timeout(Duration::from_millis(100))
        .with_batch_stall_timeout(Duration::from_millis(100));
    let kb = VialKeyboard::with_config(mock.clone(), config);
    (sim, mock, kb)
}

/// Written reports starting with `cmd`
pub fn written_with(mock: &MockTransport, cmd: u8) -> Vec<Vec<u8>> {
    mock.written()
        .into_iter()
        .filter(|r| r.first() == Some(&cmd))
        .collect()
}
