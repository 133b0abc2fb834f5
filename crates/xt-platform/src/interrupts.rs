/// Interrupt request line into the platform interrupt controller.
///
/// Legacy ISA devices drive their IRQ line as a level: the device raises it when
/// it has something for the guest and lowers it again once the guest has
/// acknowledged the condition at the device.
pub trait IrqSink {
    fn raise_irq(&mut self, irq: u8);
    fn lower_irq(&mut self, irq: u8);
}

impl<T: IrqSink + ?Sized> IrqSink for Box<T> {
    fn raise_irq(&mut self, irq: u8) {
        (**self).raise_irq(irq);
    }

    fn lower_irq(&mut self, irq: u8) {
        (**self).lower_irq(irq);
    }
}
